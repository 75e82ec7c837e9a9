//! commit::error
//!
//! Errors from the commit engine.

use thiserror::Error;

use super::conflict::ConflictEntry;
use super::request::CommitRequest;
use crate::core::types::PathViolation;
use crate::git::{GitError, IndexError};

/// Why a commit was not created.
///
/// - [`CommitError::InvalidPath`] and [`CommitError::InvalidRequest`] are
///   usage errors; retrying the same request fails the same way.
/// - [`CommitError::HeadChanged`] is the expected outcome of a lost race:
///   re-read the branch, rebuild the request and retry.
/// - [`CommitError::Git`] is a store or environment failure, surfaced as is.
///
/// In every case nothing was written to the target branch.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A file change is inconsistent with the tree it applies to.
    #[error("invalid path '{path}': {violation}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// What is wrong with it
        violation: PathViolation,
    },

    /// The request itself is malformed.
    #[error("invalid commit request: {message}")]
    InvalidRequest {
        /// Description of the problem
        message: String,
    },

    /// The branch moved and the request could not be merged onto it.
    #[error(
        "the branch has changed since editing and cannot be merged automatically ({} conflicting path(s))",
        .conflicts.len()
    )]
    HeadChanged {
        /// Conflicting paths
        conflicts: Vec<ConflictEntry>,
        /// The request as the caller submitted it
        request: Box<CommitRequest>,
    },

    /// Object-store failure.
    #[error(transparent)]
    Git(#[from] GitError),
}

impl CommitError {
    /// Whether retrying against a fresh branch tip may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::HeadChanged { .. })
    }

    /// Whether this is a file/directory type collision.
    pub fn is_blob_name_collision(&self) -> bool {
        matches!(
            self,
            CommitError::InvalidPath { violation, .. } if violation.is_blob_name_collision()
        )
    }

    /// The conflict list of a `HeadChanged` error.
    pub fn conflicts(&self) -> Option<&[ConflictEntry]> {
        match self {
            CommitError::HeadChanged { conflicts, .. } => Some(conflicts),
            _ => None,
        }
    }
}

impl From<IndexError> for CommitError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidPath { path, violation } => CommitError::InvalidPath { path, violation },
            IndexError::Git(e) => CommitError::Git(e),
        }
    }
}
