//! repo
//!
//! High-level repository handle.
//!
//! [`Repository`] bundles a [`Git`] handle with its configuration and
//! storage paths, and offers:
//! - single-file commit conveniences that wrap one [`FileChange`] into a
//!   [`CommitRequest`]
//! - commits under the per-repository [`RepoLock`]
//! - blob, branch and tag access
//!
//! # Example
//!
//! ```ignore
//! use stagehand::repo::Repository;
//!
//! let repo = Repository::create(Path::new("/srv/story.git"))?;
//! let details = CommitDetails::new(Signature::new("Jane", "jane@example.com"), "Add story");
//! let oid = repo.create_file(details, "docs/story.txt", "Lorem ipsum", None)?;
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::commit::{CommitDetails, CommitEngine, CommitError, CommitRequest, FileChange};
use crate::core::config::{Config, ConfigError};
use crate::core::lock::{LockError, RepoLock};
use crate::core::paths::StagehandPaths;
use crate::core::types::{BranchName, Oid, PathViolation, RefName, RepoPath, Signature, TypeError};
use crate::git::{Git, GitError};

/// Errors from repository-level operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// `create` was pointed at an existing path.
    #[error("repository path already exists: {path}")]
    PathExists {
        /// The path given to `create`
        path: PathBuf,
    },

    /// A branch, tag or path name was rejected.
    #[error("invalid name: {0}")]
    InvalidName(#[from] TypeError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// A repository opened for committing.
#[derive(Debug)]
pub struct Repository {
    git: Git,
    paths: StagehandPaths,
    config: Config,
}

impl Repository {
    /// Initialize a new bare repository at `path`.
    ///
    /// # Errors
    ///
    /// - [`RepoError::PathExists`] if anything already exists at `path`
    pub fn create(path: &Path) -> Result<Self, RepoError> {
        if path.exists() {
            return Err(RepoError::PathExists {
                path: path.to_path_buf(),
            });
        }
        let git = Git::init_bare(path)?;
        tracing::debug!(path = %path.display(), "initialized bare repository");
        Self::from_git(git)
    }

    /// Open an existing repository.
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        Self::from_git(Git::open(path)?)
    }

    fn from_git(git: Git) -> Result<Self, RepoError> {
        let paths = StagehandPaths::from_repo_info(&git.info());
        let config = Config::load(Some(&paths))?;
        Ok(Self { git, paths, config })
    }

    /// The underlying object-store handle.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Storage locations for this repository.
    pub fn paths(&self) -> &StagehandPaths {
        &self.paths
    }

    /// The effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn engine(&self) -> CommitEngine<'_> {
        CommitEngine::with_config(&self.git, self.config.clone())
    }

    // =========================================================================
    // Committing
    // =========================================================================

    /// Apply a multi-file request. See [`CommitEngine::commit`].
    ///
    /// The caller is responsible for serializing writers; see
    /// [`Repository::commit_locked`].
    pub fn commit_multichange(
        &self,
        request: &CommitRequest,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        self.engine().commit(request, previous_head)
    }

    /// Apply a multi-file request while holding the repository lock.
    ///
    /// # Errors
    ///
    /// - [`RepoError::Lock`] with [`LockError::AlreadyLocked`] if another
    ///   writer holds the lock
    /// - [`RepoError::Commit`] for any commit failure
    pub fn commit_locked(
        &self,
        request: &CommitRequest,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, RepoError> {
        let _lock = RepoLock::acquire(&self.paths)?;
        Ok(self.commit_multichange(request, previous_head)?)
    }

    pub fn create_file(
        &self,
        details: CommitDetails,
        path: &str,
        content: impl Into<String>,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change = FileChange::create(repo_path(path)?, content);
        self.commit_single(details, change, previous_head)
    }

    pub fn update_file(
        &self,
        details: CommitDetails,
        path: &str,
        content: impl Into<String>,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change = FileChange::update(repo_path(path)?, content);
        self.commit_single(details, change, previous_head)
    }

    /// Move a file without changing its content.
    pub fn rename_file(
        &self,
        details: CommitDetails,
        previous_path: &str,
        path: &str,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change = FileChange::rename(repo_path(path)?, repo_path(previous_path)?);
        self.commit_single(details, change, previous_head)
    }

    pub fn rename_and_update_file(
        &self,
        details: CommitDetails,
        previous_path: &str,
        path: &str,
        content: impl Into<String>,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change =
            FileChange::rename_and_update(repo_path(path)?, repo_path(previous_path)?, content);
        self.commit_single(details, change, previous_head)
    }

    pub fn remove_file(
        &self,
        details: CommitDetails,
        path: &str,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change = FileChange::remove(repo_path(path)?);
        self.commit_single(details, change, previous_head)
    }

    /// Create a directory, and any missing parents, holding a placeholder
    /// file.
    pub fn mkdir(
        &self,
        details: CommitDetails,
        path: &str,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        let change = FileChange::mkdir(repo_path(path)?);
        self.commit_single(details, change, previous_head)
    }

    fn commit_single(
        &self,
        details: CommitDetails,
        change: FileChange,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        self.commit_multichange(&CommitRequest::single(details, change), previous_head)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Content of the file at `path` as of `revision`.
    ///
    /// Returns `None` if no file exists there.
    pub fn blob(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>, RepoError> {
        let commit = self.git.resolve_revision(revision)?;
        match self.git.blob_at(&commit, &RepoPath::new(path)?)? {
            Some(entry) => Ok(Some(self.git.read_blob(&entry.oid)?)),
            None => Ok(None),
        }
    }

    /// Whether a file exists at `path` as of `revision`.
    pub fn path_exists(&self, revision: &str, path: &str) -> Result<bool, RepoError> {
        let commit = self.git.resolve_revision(revision)?;
        Ok(self.git.blob_at(&commit, &RepoPath::new(path)?)?.is_some())
    }

    /// Tip of a branch given by short name or full ref.
    pub fn branch_sha(&self, name: &str) -> Result<Option<Oid>, RepoError> {
        let refname = RefName::qualify_branch(name)?;
        Ok(self.git.try_resolve_ref(&refname)?)
    }

    /// Short name of the default branch.
    pub fn default_branch(&self) -> Result<String, RepoError> {
        let branch = self.engine().default_branch()?;
        let refname = RefName::qualify_branch(&branch)?;
        Ok(refname.shorthand().to_string())
    }

    /// Point `HEAD` at `name`, making it the default branch for requests
    /// that name none (unless configuration overrides it).
    pub fn set_default_branch(&self, name: &str) -> Result<(), RepoError> {
        let branch = BranchName::new(name)?;
        self.git.set_head(&RefName::for_branch(&branch))?;
        Ok(())
    }

    pub fn branch_names(&self) -> Result<Vec<String>, RepoError> {
        Ok(self
            .git
            .list_branches()?
            .into_iter()
            .map(String::from)
            .collect())
    }

    pub fn tag_names(&self) -> Result<Vec<String>, RepoError> {
        Ok(self.git.list_tags()?)
    }

    /// Whether the repository has no commits.
    pub fn is_empty(&self) -> Result<bool, RepoError> {
        Ok(self.git.is_empty()?)
    }

    // =========================================================================
    // Branches and Tags
    // =========================================================================

    /// Create a branch at `revision` and return its tip.
    pub fn create_branch(&self, name: &str, revision: &str) -> Result<Oid, RepoError> {
        let branch = BranchName::new(name)?;
        let target = self.git.resolve_revision(revision)?;
        self.git.create_branch(&branch, &target)?;
        Ok(target)
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        self.git.delete_branch(&BranchName::new(name)?)?;
        Ok(())
    }

    /// Create a tag at `revision`.
    ///
    /// `annotation` (message, tagger) makes an annotated tag; without it the
    /// tag is lightweight.
    pub fn create_tag(
        &self,
        name: &str,
        revision: &str,
        annotation: Option<(&str, &Signature)>,
    ) -> Result<Oid, RepoError> {
        let tag = BranchName::new(name)?;
        let target = self.git.resolve_revision(revision)?;
        self.git.create_tag(&tag, &target, annotation)?;
        Ok(target)
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), RepoError> {
        self.git.delete_tag(&BranchName::new(name)?)?;
        Ok(())
    }
}

fn repo_path(path: &str) -> Result<RepoPath, CommitError> {
    RepoPath::new(path).map_err(|e| CommitError::InvalidPath {
        path: path.to_string(),
        violation: PathViolation::Malformed(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn malformed_path_is_invalid_path() {
        match repo_path("a/../b") {
            Err(CommitError::InvalidPath { path, violation }) => {
                assert_eq!(path, "a/../b");
                assert!(matches!(violation, PathViolation::Malformed(_)));
            }
            other => panic!("expected InvalidPath, got {other:?}"),
        }
    }

    #[test]
    fn create_refuses_existing_path() {
        let temp = TempDir::new().unwrap();
        let result = Repository::create(temp.path());
        assert!(matches!(result, Err(RepoError::PathExists { .. })));
    }

    #[test]
    fn create_then_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repo.git");
        let created = Repository::create(&path).unwrap();
        assert!(created.is_empty().unwrap());
        assert!(!created.paths().is_worktree());

        let opened = Repository::open(&path).unwrap();
        assert!(opened.is_empty().unwrap());
        assert!(opened.paths().repo_config_path().ends_with("stagehand/config.toml"));
    }
}
