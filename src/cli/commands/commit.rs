//! commit command - Apply a JSON commit request

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::open;
use crate::commit::{CommitError, CommitRequest};
use crate::core::types::Oid;
use crate::repo::RepoError;

/// Exit status when the branch moved and the request conflicts.
pub const CONFLICT_EXIT_CODE: u8 = 2;

/// Apply the request read from `source` (a path, or `-` for stdin).
///
/// Prints the new commit id. On a merge conflict, prints the conflict list
/// as JSON and returns [`CONFLICT_EXIT_CODE`].
pub fn commit(repo: &Path, source: &str, previous_head: Option<&str>) -> Result<ExitCode> {
    let request = read_request(source)?;
    let previous_head = previous_head
        .map(Oid::new)
        .transpose()
        .context("Invalid --previous-head")?;

    let repo = open(repo)?;
    match repo.commit_locked(&request, previous_head.as_ref()) {
        Ok(oid) => {
            println!("{}", oid);
            Ok(ExitCode::SUCCESS)
        }
        Err(RepoError::Commit(err @ CommitError::HeadChanged { .. })) => {
            let conflicts = err.conflicts().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(conflicts)?);
            eprintln!("error: {}", err);
            Ok(ExitCode::from(CONFLICT_EXIT_CODE))
        }
        Err(err) => Err(err).context("Commit failed"),
    }
}

fn read_request(source: &str) -> Result<CommitRequest> {
    let raw = if source == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        raw
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read request file {}", source))?
    };
    serde_json::from_str(&raw).context("Failed to parse commit request")
}
