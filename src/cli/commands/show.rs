//! show command - Print a file as of a revision

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Result};

use super::open;

/// Write the content of `file` at `revision` to stdout, unmodified.
pub fn show(repo: &Path, revision: &str, file: &str) -> Result<ExitCode> {
    let repo = open(repo)?;
    let Some(content) = repo.blob(revision, file)? else {
        bail!("'{}' does not exist at {}", file, revision);
    };
    let mut stdout = io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}
