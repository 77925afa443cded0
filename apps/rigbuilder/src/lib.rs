//! # RigBuilder
//!
//! Command-line host for the RigBuilder module engine: settings, console
//! reporting and the CLI commands. The binary in `main.rs` wires these to
//! logging and process exit codes.

pub mod cli;
pub mod config;
pub mod reporter;
