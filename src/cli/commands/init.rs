//! init command - Create a new bare repository

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::repo::Repository;

/// Create a bare repository at `path` and print where it went.
pub fn init(path: &Path) -> Result<()> {
    let repo = Repository::create(path)
        .with_context(|| format!("Failed to create repository at {}", path.display()))?;
    println!("Initialized empty repository in {}", repo.paths().common_dir().display());
    Ok(())
}
