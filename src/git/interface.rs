//! git::interface
//!
//! Object-store access through git2.
//!
//! # Architecture
//!
//! The `Git` struct is the only way to reach a repository's objects and
//! refs. No module outside `git` imports `git2`; everything that crosses
//! the boundary is a strong type from [`crate::core::types`].
//!
//! # Error Handling
//!
//! git2 errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: No repository at the given path
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::BadRevision`]: A revision expression did not resolve
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::AlreadyExists`]: A ref or tag with that name exists
//!
//! # Example
//!
//! ```ignore
//! use stagehand::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/repo.git"))?;
//! let tip = git.try_resolve_ref(&RefName::qualify_branch("master")?)?;
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::index::MergeIndex;
use crate::core::types::{BranchName, Oid, RefName, RepoPath, Signature, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// A revision expression could not be resolved to a commit.
    #[error("bad revision: {revision}")]
    BadRevision {
        /// The revision as given
        revision: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref moved between the read that produced `expected` and the
    /// write. Nothing was written.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// A ref, branch or tag with this name already exists.
    #[error("already exists: {name}")]
    AlreadyExists {
        /// The conflicting name
        name: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Invalid repository path.
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Description of the problem
        message: String,
    },

    /// Author, committer or tagger identity rejected by git.
    #[error("invalid signature: {message}")]
    InvalidSignature {
        /// Description of the problem
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Categorize a git2 error, using `context` (a ref name, oid or
    /// operation) to tell ref lookups from object lookups.
    pub(super) fn from_git2(err: git2::Error, context: &str) -> Self {
        let is_ref = context.starts_with("refs/") || context == "HEAD";
        match err.code() {
            git2::ErrorCode::NotFound if is_ref => GitError::RefNotFound {
                refname: context.to_string(),
            },
            git2::ErrorCode::NotFound => GitError::ObjectNotFound {
                oid: context.to_string(),
            },
            git2::ErrorCode::Exists => GitError::AlreadyExists {
                name: context.to_string(),
            },
            git2::ErrorCode::InvalidSpec if is_ref => GitError::InvalidRefName {
                message: format!("{}: {}", context, err.message()),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidPath(msg) => GitError::InvalidPath { message: msg },
        }
    }
}

/// Convert a strong OID into a git2 OID.
pub(super) fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

/// Convert a git2 OID into a strong OID.
pub(super) fn from_git2_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Ok(Oid::new(oid.to_string())?)
}

fn to_git2_signature(sig: &Signature) -> Result<git2::Signature<'static>, GitError> {
    let when: DateTime<FixedOffset> = sig.time.unwrap_or_else(|| Utc::now().into());
    let time = git2::Time::new(when.timestamp(), when.offset().local_minus_utc() / 60);
    git2::Signature::new(&sig.name, &sig.email, &time).map_err(|e| GitError::InvalidSignature {
        message: e.message().to_string(),
    })
}

fn signature_from_git2(sig: &git2::Signature<'_>) -> Signature {
    let when = sig.when();
    let time = FixedOffset::east_opt(when.offset_minutes() * 60).and_then(|offset| {
        DateTime::from_timestamp(when.seconds(), 0).map(|utc| utc.with_timezone(&offset))
    });
    Signature {
        name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
        email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
        time,
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Path to the git directory (the repository itself when bare)
    pub git_dir: PathBuf,
    /// Path to the directory shared by all worktrees
    pub common_dir: PathBuf,
    /// Path to the working directory, `None` for bare repositories
    pub work_dir: Option<PathBuf>,
}

/// A ref with its name and target OID.
#[derive(Debug, Clone)]
pub struct RefEntry {
    /// The full ref name
    pub name: RefName,
    /// The OID the ref points to
    pub oid: Oid,
}

/// A blob as it appears at one path of one tree.
///
/// Serialized as a conflict stage descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Path of the blob within the tree
    pub path: RepoPath,
    /// Blob object id
    pub oid: Oid,
    /// Git file mode (e.g. `0o100644`)
    pub mode: u32,
}

/// Result of a textual three-way merge of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeText {
    /// Whether the merge completed without conflict markers
    pub automergeable: bool,
    /// Path recorded by the merge, if any
    pub path: Option<String>,
    /// File mode of the merge result
    pub filemode: u32,
    /// Merged text, with conflict markers where the sides disagree
    pub data: String,
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// The root tree
    pub tree: Oid,
    /// Parent commits, in order
    pub parents: Vec<Oid>,
    /// Full commit message
    pub message: String,
    /// Author identity and time
    pub author: Signature,
    /// Committer identity and time
    pub committer: Signature,
}

/// The Git interface.
///
/// All object and ref access flows through here. Ref mutations that must
/// not race use compare-and-swap semantics (see [`Git::update_ref_cas`]).
pub struct Git {
    /// The underlying git2 repository
    pub(super) repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open a repository at the given path.
    ///
    /// Bare and non-bare repositories are both accepted; `path` may be any
    /// directory inside a non-bare repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Initialize a new bare repository at `path`.
    pub fn init_bare(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::init_bare(path).map_err(|e| GitError::AccessError {
            message: format!("cannot initialize {}: {}", path.display(), e.message()),
        })?;
        Ok(Self { repo })
    }

    /// Get repository information.
    pub fn info(&self) -> RepoInfo {
        RepoInfo {
            git_dir: self.repo.path().to_path_buf(),
            common_dir: self.repo.commondir().to_path_buf(),
            work_dir: self.repo.workdir().map(Path::to_path_buf),
        }
    }

    /// Whether the repository has no commits reachable from any ref.
    pub fn is_empty(&self) -> Result<bool, GitError> {
        self.repo
            .is_empty()
            .map_err(|e| GitError::from_git2(e, "is_empty"))
    }

    /// Whether `core.autocrlf` asks for CRLF to be normalized on write.
    ///
    /// Both `true` and `input` enable normalization; anything else, including
    /// an unset key, disables it.
    pub fn autocrlf(&self) -> bool {
        let value = self
            .repo
            .config()
            .and_then(|config| config.get_string("core.autocrlf"));
        match value {
            Ok(v) => matches!(
                v.to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1" | "input"
            ),
            Err(_) => false,
        }
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &RefName) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname.as_str())
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;

        from_git2_oid(commit.id())
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &RefName) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a revision expression (sha, branch, tag, `HEAD~1`, ...) to a
    /// commit.
    ///
    /// # Errors
    ///
    /// - [`GitError::BadRevision`] if nothing matches or the match is not a commit
    pub fn resolve_revision(&self, revision: &str) -> Result<Oid, GitError> {
        let bad = || GitError::BadRevision {
            revision: revision.to_string(),
        };
        let object = self.repo.revparse_single(revision).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound
            | git2::ErrorCode::InvalidSpec
            | git2::ErrorCode::Ambiguous => bad(),
            _ => GitError::from_git2(e, revision),
        })?;
        let commit = object.peel_to_commit().map_err(|_| bad())?;
        from_git2_oid(commit.id())
    }

    /// The ref `HEAD` points at symbolically, if it is a symbolic ref.
    pub fn head_target(&self) -> Result<Option<RefName>, GitError> {
        let head = match self.repo.find_reference("HEAD") {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        match head.symbolic_target() {
            Some(target) => Ok(Some(RefName::new(target)?)),
            None => Ok(None),
        }
    }

    /// Point `HEAD` at `refname` symbolically.
    pub fn set_head(&self, refname: &RefName) -> Result<(), GitError> {
        self.repo
            .set_head(refname.as_str())
            .map_err(|e| GitError::from_git2(e, refname.as_str()))
    }

    /// List all refs whose name starts with `prefix`.
    pub fn list_refs_by_prefix(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        let pattern = format!("{}*", prefix);
        let refs = self
            .repo
            .references_glob(&pattern)
            .map_err(|e| GitError::from_git2(e, prefix))?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(|e| GitError::from_git2(e, prefix))?;

            // Skip non-UTF8 and symbolic refs
            let (Some(name), Some(target)) = (reference.name(), reference.target()) else {
                continue;
            };
            let Ok(name) = RefName::new(name) else {
                continue;
            };

            entries.push(RefEntry {
                name,
                oid: from_git2_oid(target)?,
            });
        }

        Ok(entries)
    }

    // =========================================================================
    // Ref Mutation
    // =========================================================================

    /// Create a ref that must not exist yet.
    ///
    /// # Errors
    ///
    /// - [`GitError::AlreadyExists`] if the ref exists
    pub fn create_ref(&self, refname: &RefName, oid: &Oid, message: &str) -> Result<(), GitError> {
        self.repo
            .reference(refname.as_str(), to_git2(oid)?, false, message)
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
        Ok(())
    }

    /// Delete a ref.
    ///
    /// Returns `false` if the ref did not exist.
    pub fn delete_ref(&self, refname: &RefName) -> Result<bool, GitError> {
        let mut reference = match self.repo.find_reference(refname.as_str()) {
            Ok(r) => r,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(false),
            Err(e) => return Err(GitError::from_git2(e, refname.as_str())),
        };
        reference
            .delete()
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
        Ok(true)
    }

    /// Update a ref with compare-and-swap semantics.
    ///
    /// The update only succeeds if the ref currently points at
    /// `expected_old`. If `expected_old` is `None`, the ref must not exist.
    /// The check and the write happen in one libgit2 call, under the ref's
    /// own lock file.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    pub fn update_ref_cas(
        &self,
        refname: &RefName,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let new = to_git2(new_oid)?;
        let result = match expected_old {
            Some(expected) => self.repo.reference_matching(
                refname.as_str(),
                new,
                true,
                to_git2(expected)?,
                message,
            ),
            None => self.repo.reference(refname.as_str(), new, false, message),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.code(),
                    git2::ErrorCode::Modified | git2::ErrorCode::Exists | git2::ErrorCode::NotFound
                ) =>
            {
                let actual = self
                    .try_resolve_ref_raw(refname)?
                    .unwrap_or_else(|| "<none>".to_string());
                Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected_old
                        .map(Oid::to_string)
                        .unwrap_or_else(|| "<none>".to_string()),
                    actual,
                })
            }
            Err(e) => Err(GitError::from_git2(e, refname.as_str())),
        }
    }

    /// Direct target of a ref, without peeling.
    fn try_resolve_ref_raw(&self, refname: &RefName) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname.as_str()) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                Ok(resolved.target().map(|oid| oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname.as_str())),
        }
    }

    // =========================================================================
    // Branches and Tags
    // =========================================================================

    /// List local branch names, sorted.
    pub fn list_branches(&self) -> Result<Vec<BranchName>, GitError> {
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(|e| GitError::from_git2(e, "list branches"))?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| GitError::from_git2(e, "list branches"))?;
            if let Some(name) = branch.name().ok().flatten() {
                if let Ok(branch_name) = BranchName::new(name) {
                    names.push(branch_name);
                }
            }
        }
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        Ok(names)
    }

    /// Create a branch at `target`.
    ///
    /// # Errors
    ///
    /// - [`GitError::AlreadyExists`] if the branch exists
    pub fn create_branch(&self, name: &BranchName, target: &Oid) -> Result<(), GitError> {
        let commit = self.find_commit(target)?;
        self.repo
            .branch(name.as_str(), &commit, false)
            .map_err(|e| GitError::from_git2(e, RefName::for_branch(name).as_str()))?;
        Ok(())
    }

    /// Delete a local branch.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the branch doesn't exist
    pub fn delete_branch(&self, name: &BranchName) -> Result<(), GitError> {
        let refname = RefName::for_branch(name);
        let mut branch = self
            .repo
            .find_branch(name.as_str(), git2::BranchType::Local)
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
        branch
            .delete()
            .map_err(|e| GitError::from_git2(e, refname.as_str()))
    }

    /// List tag names, sorted.
    pub fn list_tags(&self) -> Result<Vec<String>, GitError> {
        let tags = self
            .repo
            .tag_names(None)
            .map_err(|e| GitError::from_git2(e, "list tags"))?;
        let mut names: Vec<String> = tags.iter().flatten().map(String::from).collect();
        names.sort();
        Ok(names)
    }

    /// Create a tag at `target`.
    ///
    /// With `annotation` (message and tagger) an annotated tag object is
    /// written; otherwise the tag is lightweight.
    ///
    /// # Errors
    ///
    /// - [`GitError::AlreadyExists`] if the tag exists
    pub fn create_tag(
        &self,
        name: &BranchName,
        target: &Oid,
        annotation: Option<(&str, &Signature)>,
    ) -> Result<(), GitError> {
        let refname = RefName::for_tag(name);
        let object = self
            .repo
            .find_object(to_git2(target)?, None)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;

        let result = match annotation {
            Some((message, tagger)) => {
                let tagger = to_git2_signature(tagger)?;
                self.repo
                    .tag(name.as_str(), &object, &tagger, message, false)
            }
            None => self.repo.tag_lightweight(name.as_str(), &object, false),
        };
        result.map_err(|e| GitError::from_git2(e, refname.as_str()))?;
        Ok(())
    }

    /// Delete a tag.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the tag doesn't exist
    pub fn delete_tag(&self, name: &BranchName) -> Result<(), GitError> {
        self.repo
            .tag_delete(name.as_str())
            .map_err(|e| GitError::from_git2(e, RefName::for_tag(name).as_str()))
    }

    // =========================================================================
    // Blob Operations
    // =========================================================================

    /// Write content as a blob and return its OID.
    pub fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let oid = self
            .repo
            .blob(content)
            .map_err(|e| GitError::from_git2(e, "write blob"))?;
        from_git2_oid(oid)
    }

    /// Read a blob by OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the blob doesn't exist
    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        let blob = self
            .repo
            .find_blob(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok(blob.content().to_vec())
    }

    /// The blob at `path` in `commit`'s tree.
    ///
    /// Returns `None` when nothing is at `path` or the entry is a
    /// directory or submodule.
    pub fn blob_at(&self, commit: &Oid, path: &RepoPath) -> Result<Option<BlobEntry>, GitError> {
        let tree = self
            .find_commit(commit)?
            .tree()
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;

        let entry = match tree.get_path(Path::new(path.as_str())) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, path.as_str())),
        };
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return Ok(None);
        }

        Ok(Some(BlobEntry {
            path: path.clone(),
            oid: from_git2_oid(entry.id())?,
            mode: entry.filemode() as u32,
        }))
    }

    /// Every blob path in `commit`'s tree, in tree order.
    pub fn tree_paths(&self, commit: &Oid) -> Result<Vec<RepoPath>, GitError> {
        let tree = self
            .find_commit(commit)?
            .tree()
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;

        let mut paths = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    if let Ok(path) = RepoPath::new(format!("{}{}", root, name)) {
                        paths.push(path);
                    }
                }
            }
            git2::TreeWalkResult::Ok
        })
        .map_err(|e| GitError::from_git2(e, commit.as_str()))?;

        Ok(paths)
    }

    // =========================================================================
    // Commits
    // =========================================================================

    pub(super) fn find_commit(&self, oid: &Oid) -> Result<git2::Commit<'_>, GitError> {
        self.repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))
    }

    /// The root tree of a commit.
    pub fn commit_tree(&self, oid: &Oid) -> Result<Oid, GitError> {
        from_git2_oid(self.find_commit(oid)?.tree_id())
    }

    /// The parent OIDs of a commit. Empty for root commits.
    pub fn commit_parents(&self, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        self.find_commit(oid)?
            .parent_ids()
            .map(from_git2_oid)
            .collect()
    }

    /// Get information about a commit.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the commit doesn't exist
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self.find_commit(oid)?;
        let author = commit.author();
        let committer = commit.committer();

        let info = CommitInfo {
            oid: oid.clone(),
            tree: from_git2_oid(commit.tree_id())?,
            parents: commit
                .parent_ids()
                .map(from_git2_oid)
                .collect::<Result<_, _>>()?,
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author: signature_from_git2(&author),
            committer: signature_from_git2(&committer),
        };
        Ok(info)
    }

    /// Write a commit object. No ref is touched.
    ///
    /// Signatures without a time are stamped with the current time.
    pub fn create_commit(
        &self,
        tree: &Oid,
        parents: &[Oid],
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<Oid, GitError> {
        let tree = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;
        let parents = parents
            .iter()
            .map(|p| self.find_commit(p))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let author = to_git2_signature(author)?;
        let committer = to_git2_signature(committer)?;

        let oid = self
            .repo
            .commit(None, &author, &committer, message, &tree, &parent_refs)
            .map_err(|e| GitError::from_git2(e, "create commit"))?;
        from_git2_oid(oid)
    }

    // =========================================================================
    // Merging
    // =========================================================================

    /// Three-way merge of two commits, common ancestor taken from history.
    ///
    /// Nothing is written; the result is an in-memory index holding the
    /// merged tree and any conflicts.
    pub fn merge_commits(&self, ours: &Oid, theirs: &Oid) -> Result<MergeIndex<'_>, GitError> {
        let our_commit = self.find_commit(ours)?;
        let their_commit = self.find_commit(theirs)?;
        let index = self
            .repo
            .merge_commits(&our_commit, &their_commit, None)
            .map_err(|e| GitError::from_git2(e, "merge commits"))?;
        Ok(MergeIndex::new(self, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        fn err(code: git2::ErrorCode) -> git2::Error {
            git2::Error::new(code, git2::ErrorClass::Reference, "boom")
        }

        #[test]
        fn not_found_on_ref_context() {
            let e = GitError::from_git2(err(git2::ErrorCode::NotFound), "refs/heads/main");
            assert!(matches!(e, GitError::RefNotFound { refname } if refname == "refs/heads/main"));
        }

        #[test]
        fn not_found_on_object_context() {
            let e = GitError::from_git2(err(git2::ErrorCode::NotFound), "abc123");
            assert!(matches!(e, GitError::ObjectNotFound { .. }));
        }

        #[test]
        fn exists_maps_to_already_exists() {
            let e = GitError::from_git2(err(git2::ErrorCode::Exists), "refs/tags/v1");
            assert!(matches!(e, GitError::AlreadyExists { name } if name == "refs/tags/v1"));
        }

        #[test]
        fn other_codes_are_internal() {
            let e = GitError::from_git2(err(git2::ErrorCode::GenericError), "merge commits");
            assert!(e.to_string().contains("merge commits"));
        }

        #[test]
        fn cas_display() {
            let err = GitError::CasFailed {
                refname: "refs/heads/main".to_string(),
                expected: "abc".to_string(),
                actual: "def".to_string(),
            };
            assert!(err.to_string().contains("CAS failed"));
            assert!(err.to_string().contains("refs/heads/main"));
        }

        #[test]
        fn type_errors_convert() {
            let e: GitError = TypeError::InvalidPath("empty".into()).into();
            assert!(matches!(e, GitError::InvalidPath { .. }));
        }
    }

    mod signatures {
        use super::*;

        #[test]
        fn time_and_offset_survive_conversion() {
            let time = DateTime::parse_from_rfc3339("2021-06-01T12:30:00+05:30").unwrap();
            let sig = Signature::new("Jane", "jane@example.com").at(time);

            let git_sig = to_git2_signature(&sig).unwrap();
            assert_eq!(git_sig.when().offset_minutes(), 330);

            let back = signature_from_git2(&git_sig);
            assert_eq!(back, sig);
        }

        #[test]
        fn missing_time_is_filled() {
            let git_sig = to_git2_signature(&Signature::new("A", "a@example.com")).unwrap();
            assert!(git_sig.when().seconds() > 0);
        }
    }

    mod repository {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn open_missing_repo_fails() {
            let temp = TempDir::new().unwrap();
            let result = Git::open(temp.path());
            assert!(matches!(result, Err(GitError::NotARepo { .. })));
        }

        #[test]
        fn init_bare_info() {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(&temp.path().join("repo.git")).unwrap();
            let info = git.info();
            assert!(info.work_dir.is_none());
            assert_eq!(info.git_dir, info.common_dir);
            assert!(git.is_empty().unwrap());
        }

        #[test]
        fn autocrlf_follows_config() {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(temp.path()).unwrap();
            assert!(!git.autocrlf());

            git.repo
                .config()
                .unwrap()
                .set_str("core.autocrlf", "input")
                .unwrap();
            assert!(git.autocrlf());
        }

        #[test]
        fn cas_rejects_stale_expectation() {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(temp.path()).unwrap();
            let blob = git.write_blob(b"x").unwrap();
            let refname = RefName::new("refs/test/a").unwrap();

            git.update_ref_cas(&refname, &blob, None, "create").unwrap();
            // Creating again with no expectation must fail
            let again = git.update_ref_cas(&refname, &blob, None, "create");
            assert!(matches!(again, Err(GitError::CasFailed { .. })));

            let other = git.write_blob(b"y").unwrap();
            let stale = git.update_ref_cas(&refname, &other, Some(&other), "update");
            assert!(matches!(stale, Err(GitError::CasFailed { actual, .. }) if actual == blob.as_str()));

            git.update_ref_cas(&refname, &other, Some(&blob), "update")
                .unwrap();
        }

        #[test]
        fn commit_info_reads_back_commit() {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(temp.path()).unwrap();
            let tree = git.repo.treebuilder(None).unwrap().write().unwrap();
            let tree = from_git2_oid(tree).unwrap();
            let time = DateTime::parse_from_rfc3339("2023-03-04T05:06:07-02:00").unwrap();
            let author = Signature::new("Author", "author@example.com").at(time);
            let committer = Signature::new("Committer", "committer@example.com").at(time);

            let root = git
                .create_commit(&tree, &[], &author, &committer, "root")
                .unwrap();
            let child = git
                .create_commit(&tree, &[root.clone()], &author, &committer, "child\n\nbody")
                .unwrap();

            let info = git.commit_info(&child).unwrap();
            assert_eq!(info.oid, child);
            assert_eq!(info.tree, tree);
            assert_eq!(info.parents, vec![root]);
            assert_eq!(info.message, "child\n\nbody");
            assert_eq!(info.author, author);
            assert_eq!(info.committer, committer);
        }

        #[test]
        fn delete_missing_ref_is_false() {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(temp.path()).unwrap();
            let refname = RefName::new("refs/merges/user/none").unwrap();
            assert!(!git.delete_ref(&refname).unwrap());
        }
    }
}
