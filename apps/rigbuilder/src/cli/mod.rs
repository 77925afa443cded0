//! # RigBuilder CLI Module
//!
//! This module implements the CLI interface for RigBuilder.
//!
//! ## Available Commands
//!
//! - `run` - Load, update and run a module
//! - `tree` - Print a module's hierarchy, attributes and connections
//! - `uids` - Print the UID caches of both module roots
//! - `update` - Update a module file's children from their references
//! - `validate` - Report invalid names, duplicates and broken connections

mod commands;

use crate::config::{self, Settings};
use clap::{Parser, Subcommand};
use rigbuilder_core::{RigError, UpdateSource};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// RigBuilder - procedural rig modules
///
/// Loads module files, resolves attribute connections and runs module scripts.
#[derive(Parser, Debug)]
#[command(name = "rigbuilder")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress script print output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a settings file (default: <local modules>/settings.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Shared module root
    #[arg(long, global = true)]
    pub server_modules: Option<PathBuf>,

    /// User module root
    #[arg(long, global = true)]
    pub local_modules: Option<PathBuf>,

    /// UID cache consulted by update: all, server, local or file
    #[arg(short, long, global = true)]
    pub source: Option<UpdateSource>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, update and run a module, then print its data bindings
    Run {
        /// UID, file path, or path relative to a module root
        spec: String,
    },

    /// Print a module's hierarchy, attributes and connections
    Tree {
        /// UID, file path, or path relative to a module root
        spec: String,
    },

    /// Print the UID caches of both module roots
    Uids,

    /// Update a module file's children from their reference files
    Update {
        /// Module file to update
        file: PathBuf,

        /// Save the updated module back to the file
        #[arg(short, long)]
        write: bool,
    },

    /// Report invalid names, duplicates and broken connections
    Validate {
        /// UID, file path, or path relative to a module root
        spec: String,
    },
}

// =============================================================================
// SETTINGS RESOLUTION
// =============================================================================

/// Resolve settings for `cli`: file, then environment, then flags.
pub fn resolve_settings(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, RigError> {
    let local_root = cli
        .local_modules
        .clone()
        .or_else(|| {
            env(config::ENV_LOCAL_MODULES)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(config::default_local_modules);

    let mut settings = Settings::load(cli.config.as_deref(), &local_root)?;
    settings.apply_env(env)?;
    settings.apply_flags(
        cli.server_modules.as_deref(),
        cli.local_modules.as_deref(),
        cli.source,
    );
    Ok(settings)
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, settings: &Settings) -> Result<(), RigError> {
    let json_mode = cli.json_mode;
    let quiet = cli.quiet;

    match cli.command {
        Some(Commands::Run { spec }) => cmd_run(settings, &spec, json_mode, quiet),
        Some(Commands::Tree { spec }) => cmd_tree(settings, &spec, json_mode),
        Some(Commands::Uids) => cmd_uids(settings, json_mode),
        Some(Commands::Update { file, write }) => {
            cmd_update(settings, &file, write, json_mode)
        }
        Some(Commands::Validate { spec }) => cmd_validate(settings, &spec, json_mode),
        None => {
            // No subcommand - show the caches by default
            cmd_uids(settings, json_mode)
        }
    }
}
