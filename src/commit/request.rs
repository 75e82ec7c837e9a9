//! commit::request
//!
//! The declarative description of one commit.
//!
//! A [`CommitRequest`] is what callers build (or deserialize from JSON):
//!
//! ```json
//! {
//!   "files": [
//!     {"action": "create", "path": "docs/story.txt", "content": "Lorem ipsum"},
//!     {"action": "rename", "path": "new.txt", "previous_path": "old.txt"},
//!     {"action": "mkdir", "path": "secret"}
//!   ],
//!   "author": {"name": "Test User", "email": "user@example.com"},
//!   "committer": {"name": "Test User", "email": "user@example.com"},
//!   "message": "Wow such commit",
//!   "branch": "master"
//! }
//! ```
//!
//! Before staging, the engine turns it into a [`NormalizedRequest`]:
//! times filled in, branch qualified to a full ref, `update_ref` decided.

use std::borrow::Cow;

use base64::Engine as _;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::error::CommitError;
use crate::core::types::{RefName, RepoPath, Signature};

/// How `content` is encoded in a [`FileChange`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    /// Content is the file's text.
    #[default]
    Text,
    /// Content is standard base64 of the file's bytes.
    Base64,
}

impl ContentEncoding {
    fn is_text(&self) -> bool {
        *self == ContentEncoding::Text
    }

    fn decode<'c>(&self, content: &'c str) -> Result<Cow<'c, [u8]>, base64::DecodeError> {
        match self {
            ContentEncoding::Text => Ok(Cow::Borrowed(content.as_bytes())),
            ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map(Cow::Owned),
        }
    }
}

/// One file operation of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileChange {
    /// Add a new file.
    Create {
        path: RepoPath,
        content: String,
        #[serde(default, skip_serializing_if = "ContentEncoding::is_text")]
        encoding: ContentEncoding,
    },
    /// Replace the content of an existing file.
    Update {
        path: RepoPath,
        content: String,
        #[serde(default, skip_serializing_if = "ContentEncoding::is_text")]
        encoding: ContentEncoding,
    },
    /// Move a file, keeping its content.
    Rename {
        path: RepoPath,
        previous_path: RepoPath,
    },
    /// Move a file and replace its content.
    RenameAndUpdate {
        path: RepoPath,
        previous_path: RepoPath,
        content: String,
        #[serde(default, skip_serializing_if = "ContentEncoding::is_text")]
        encoding: ContentEncoding,
    },
    /// Delete a file.
    Remove { path: RepoPath },
    /// Create a directory, with parents, holding a placeholder file.
    Mkdir { path: RepoPath },
}

impl FileChange {
    pub fn create(path: RepoPath, content: impl Into<String>) -> Self {
        FileChange::Create {
            path,
            content: content.into(),
            encoding: ContentEncoding::Text,
        }
    }

    pub fn update(path: RepoPath, content: impl Into<String>) -> Self {
        FileChange::Update {
            path,
            content: content.into(),
            encoding: ContentEncoding::Text,
        }
    }

    pub fn rename(path: RepoPath, previous_path: RepoPath) -> Self {
        FileChange::Rename {
            path,
            previous_path,
        }
    }

    pub fn rename_and_update(
        path: RepoPath,
        previous_path: RepoPath,
        content: impl Into<String>,
    ) -> Self {
        FileChange::RenameAndUpdate {
            path,
            previous_path,
            content: content.into(),
            encoding: ContentEncoding::Text,
        }
    }

    pub fn remove(path: RepoPath) -> Self {
        FileChange::Remove { path }
    }

    pub fn mkdir(path: RepoPath) -> Self {
        FileChange::Mkdir { path }
    }

    /// Mark the content of this change as base64. No effect on changes
    /// without content.
    pub fn base64(mut self) -> Self {
        match &mut self {
            FileChange::Create { encoding, .. }
            | FileChange::Update { encoding, .. }
            | FileChange::RenameAndUpdate { encoding, .. } => *encoding = ContentEncoding::Base64,
            _ => {}
        }
        self
    }

    /// The path this change acts on.
    pub fn path(&self) -> &RepoPath {
        match self {
            FileChange::Create { path, .. }
            | FileChange::Update { path, .. }
            | FileChange::Rename { path, .. }
            | FileChange::RenameAndUpdate { path, .. }
            | FileChange::Remove { path }
            | FileChange::Mkdir { path } => path,
        }
    }

    /// The source path of a rename.
    pub fn previous_path(&self) -> Option<&RepoPath> {
        match self {
            FileChange::Rename { previous_path, .. }
            | FileChange::RenameAndUpdate { previous_path, .. } => Some(previous_path),
            _ => None,
        }
    }

    /// The action tag, as it appears in JSON.
    pub fn action(&self) -> &'static str {
        match self {
            FileChange::Create { .. } => "create",
            FileChange::Update { .. } => "update",
            FileChange::Rename { .. } => "rename",
            FileChange::RenameAndUpdate { .. } => "rename_and_update",
            FileChange::Remove { .. } => "remove",
            FileChange::Mkdir { .. } => "mkdir",
        }
    }

    /// Decoded file content, for changes that carry content.
    pub fn content_bytes(&self) -> Result<Option<Cow<'_, [u8]>>, CommitError> {
        let (content, encoding) = match self {
            FileChange::Create {
                content, encoding, ..
            }
            | FileChange::Update {
                content, encoding, ..
            }
            | FileChange::RenameAndUpdate {
                content, encoding, ..
            } => (content, encoding),
            _ => return Ok(None),
        };
        encoding
            .decode(content)
            .map(Some)
            .map_err(|e| CommitError::InvalidRequest {
                message: format!("content of '{}' is not valid base64: {}", self.path(), e),
            })
    }

    /// The path the delete/update guard inspects after a clean merge.
    ///
    /// Only updates are guarded. For `RenameAndUpdate` this is the path
    /// being moved away from.
    pub fn guarded_path(&self) -> Option<&RepoPath> {
        match self {
            FileChange::Update { path, .. } => Some(path),
            FileChange::RenameAndUpdate { previous_path, .. } => Some(previous_path),
            _ => None,
        }
    }

    /// The path this change leaves a file or directory at, if any.
    fn occupied(&self) -> Option<Occupied<'_>> {
        match self {
            FileChange::Create { path, .. }
            | FileChange::Update { path, .. }
            | FileChange::Rename { path, .. }
            | FileChange::RenameAndUpdate { path, .. } => Some(Occupied { path, directory: false }),
            FileChange::Mkdir { path } => Some(Occupied { path, directory: true }),
            FileChange::Remove { .. } => None,
        }
    }

    /// Whether this change takes away the file at `held`.
    fn vacates(&self, held: &RepoPath) -> bool {
        let gone = match self {
            FileChange::Remove { path } => path,
            FileChange::Rename { previous_path, .. }
            | FileChange::RenameAndUpdate { previous_path, .. } => previous_path,
            _ => return false,
        };
        gone == held
    }
}

/// Author, committer, message and target of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetails {
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    /// Short branch name or full ref; the default branch when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Whether to advance `branch` to the new commit; true when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ref: Option<bool>,
}

impl CommitDetails {
    /// Details with the same identity as author and committer.
    pub fn new(identity: Signature, message: impl Into<String>) -> Self {
        Self {
            author: identity.clone(),
            committer: identity,
            message: message.into(),
            branch: None,
            update_ref: None,
        }
    }

    /// Target `branch` instead of the default branch.
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Choose whether the branch ref is advanced.
    pub fn update_ref(mut self, update_ref: bool) -> Self {
        self.update_ref = Some(update_ref);
        self
    }
}

/// A multi-file commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// File operations, applied in order
    pub files: Vec<FileChange>,
    #[serde(flatten)]
    pub details: CommitDetails,
}

impl CommitRequest {
    pub fn new(details: CommitDetails, files: Vec<FileChange>) -> Self {
        Self { files, details }
    }

    /// Wrap a single file operation as a one-element request.
    pub fn single(details: CommitDetails, change: FileChange) -> Self {
        Self::new(details, vec![change])
    }

    /// Check the request for problems visible without looking at any tree.
    ///
    /// Changes are checked pairwise in order. A later change is only
    /// compared with an earlier one while no `Remove` or move in between
    /// has vacated the earlier change's path.
    ///
    /// # Errors
    ///
    /// [`CommitError::InvalidRequest`] when `files` is empty, when content
    /// cannot be decoded, or when two changes disagree about whether a path
    /// is a file or a directory.
    pub fn validate(&self) -> Result<(), CommitError> {
        if self.files.is_empty() {
            return Err(invalid_request("a commit needs at least one file change"));
        }

        for change in &self.files {
            change.content_bytes()?;
        }

        for (i, earlier) in self.files.iter().enumerate() {
            let Some(held) = earlier.occupied() else {
                continue;
            };
            for later in &self.files[i + 1..] {
                if later.vacates(held.path) {
                    break;
                }
                if let Some(other) = later.occupied() {
                    check_pair(earlier, held, later, other)?;
                }
            }
        }

        Ok(())
    }

    /// Resolve defaults and qualify the branch.
    ///
    /// `default_branch` is used when the request names no branch; `now`
    /// fills missing signature times.
    pub fn normalize(
        &self,
        default_branch: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<NormalizedRequest, CommitError> {
        let branch_name = self.details.branch.as_deref().unwrap_or(default_branch);
        let branch = RefName::qualify_branch(branch_name).map_err(|e| {
            invalid_request(format!("invalid branch '{}': {}", branch_name, e))
        })?;

        Ok(NormalizedRequest {
            files: self.files.clone(),
            author: self.details.author.or_time(now),
            committer: self.details.committer.or_time(now),
            message: self.details.message.clone(),
            branch,
            update_ref: self.details.update_ref.unwrap_or(true),
        })
    }
}

#[derive(Clone, Copy)]
struct Occupied<'a> {
    path: &'a RepoPath,
    directory: bool,
}

fn check_pair(
    earlier: &FileChange,
    held: Occupied<'_>,
    later: &FileChange,
    other: Occupied<'_>,
) -> Result<(), CommitError> {
    if let (FileChange::Create { .. }, FileChange::Create { .. }) = (earlier, later) {
        if held.path == other.path {
            return Err(invalid_request(format!("'{}' is created more than once", held.path)));
        }
    }
    if held.path == other.path && held.directory != other.directory {
        return Err(invalid_request(format!(
            "'{}' is used both as a file and as a directory",
            held.path
        )));
    }
    for (file, below) in [(held, other), (other, held)] {
        if !file.directory && file.path.is_ancestor_of(below.path) {
            return Err(invalid_request(format!(
                "'{}' is used as a file but '{}' lies below it",
                file.path, below.path
            )));
        }
    }
    Ok(())
}

fn invalid_request(message: impl Into<String>) -> CommitError {
    CommitError::InvalidRequest {
        message: message.into(),
    }
}

/// A request with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub files: Vec<FileChange>,
    /// Author, time always set
    pub author: Signature,
    /// Committer, time always set
    pub committer: Signature,
    pub message: String,
    /// Fully-qualified target ref
    pub branch: RefName,
    pub update_ref: bool,
}

impl NormalizedRequest {
    /// The same request aimed at another ref.
    pub fn retarget(&self, branch: RefName, update_ref: bool) -> Self {
        Self {
            branch,
            update_ref,
            ..self.clone()
        }
    }
}
