//! cli::commands
//!
//! Command handlers, one module per command.

mod commit;
mod init;
mod refs;
mod show;

pub use commit::{commit, CONFLICT_EXIT_CODE};
pub use init::init;
pub use refs::{branches, tags};
pub use show::show;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::repo::Repository;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command) -> Result<ExitCode> {
    match command {
        Command::Init { path } => init(&path).map(|()| ExitCode::SUCCESS),
        Command::Commit {
            repo,
            request,
            previous_head,
        } => commit(&repo, &request, previous_head.as_deref()),
        Command::Show {
            repo,
            revision,
            file,
        } => show(&repo, &revision, &file),
        Command::Branches { repo } => branches(&repo).map(|()| ExitCode::SUCCESS),
        Command::Tags { repo } => tags(&repo).map(|()| ExitCode::SUCCESS),
    }
}

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path)
        .with_context(|| format!("Failed to open repository at {}", path.display()))
}
