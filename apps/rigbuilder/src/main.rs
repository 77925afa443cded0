//! # RigBuilder - Procedural Rig Modules
//!
//! The command-line host for the RigBuilder module engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/rigbuilder (THE BINARY)              │
//! │                                                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────┐   │
//! │  │    CLI      │   │  Settings   │   │   Reporter    │   │
//! │  │   (clap)    │   │   (toml)    │   │  (tracing)    │   │
//! │  └──────┬──────┘   └──────┬──────┘   └───────┬───────┘   │
//! │         └─────────────────┼──────────────────┘           │
//! │                           ▼                              │
//! │                ┌─────────────────────┐                   │
//! │                │   rigbuilder-core   │                   │
//! │                │     (THE MODEL)     │                   │
//! │                └─────────────────────┘                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! rigbuilder run arms/ikArm
//! rigbuilder tree 6c0f3e0c2b4f4d0f9a6e2f1b7d8c9a01 --json-mode
//! rigbuilder update ~/rigBuilder/modules/biped.xml --write
//! rigbuilder validate biped
//! ```

use clap::Parser;
use rigbuilder::cli;
use rigbuilder::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    let settings = cli::resolve_settings(&cli, |key| std::env::var(key).ok());
    let log_format = settings
        .as_ref()
        .map(|s| s.log_format)
        .unwrap_or_default();
    init_tracing(log_format, cli.verbose);

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    if let Err(e) = cli::execute(cli, &settings) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing; `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "rigbuilder=debug,rigbuilder_core=debug"
    } else {
        "rigbuilder=info,rigbuilder_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
