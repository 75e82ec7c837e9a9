//! core::paths
//!
//! Centralized path routing for stagehand storage locations.
//!
//! All stagehand data lives under `<common_dir>/stagehand/`, so linked
//! worktrees of one repository share the same lock and configuration:
//! - `config.toml` - Repository configuration
//! - `lock` - Exclusive commit lock
//!
//! For bare repositories `git_dir` is the repository directory itself.
//!
//! # Example
//!
//! ```
//! use stagehand::core::paths::StagehandPaths;
//! use std::path::PathBuf;
//!
//! let paths = StagehandPaths::new(
//!     PathBuf::from("/srv/repo.git"),
//!     PathBuf::from("/srv/repo.git"),
//! );
//!
//! assert_eq!(
//!     paths.repo_config_path(),
//!     PathBuf::from("/srv/repo.git/stagehand/config.toml")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::git::RepoInfo;

/// Centralized path routing for stagehand storage.
///
/// # Invariants
///
/// - All repo-scoped storage uses `common_dir` (shared across worktrees)
/// - No code outside this module should compute `*.join("stagehand")` paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagehandPaths {
    /// Path to the per-worktree git directory.
    pub git_dir: PathBuf,

    /// Path to the shared git directory (refs, objects, config).
    pub common_dir: PathBuf,
}

impl StagehandPaths {
    /// Create paths from a git_dir and common_dir.
    pub fn new(git_dir: PathBuf, common_dir: PathBuf) -> Self {
        Self {
            git_dir,
            common_dir,
        }
    }

    /// Create paths from a RepoInfo.
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self {
            git_dir: info.git_dir.clone(),
            common_dir: info.common_dir.clone(),
        }
    }

    /// The root stagehand directory under common_dir.
    pub fn repo_stagehand_dir(&self) -> PathBuf {
        self.common_dir.join("stagehand")
    }

    /// `<common_dir>/stagehand/config.toml`
    pub fn repo_config_path(&self) -> PathBuf {
        self.repo_stagehand_dir().join("config.toml")
    }

    /// `<common_dir>/stagehand/lock`
    pub fn repo_lock_path(&self) -> PathBuf {
        self.repo_stagehand_dir().join("lock")
    }

    /// Check if this is a linked worktree (common_dir != git_dir).
    pub fn is_worktree(&self) -> bool {
        self.git_dir != self.common_dir
    }

    /// Get the common_dir as a Path reference.
    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }
}
