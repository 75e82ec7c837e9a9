//! cli
//!
//! Command-line interface layer for stagehand.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers open a [`crate::repo::Repository`] and
//! call into it; every commit goes through
//! [`crate::repo::Repository::commit_locked`].

pub mod args;
pub mod commands;

pub use args::Cli;

use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "STAGEHAND_LOG";

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);
    commands::dispatch(cli.command)
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("stagehand=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
