//! commit
//!
//! Transactional multi-file commits with optimistic concurrency.
//!
//! # Modules
//!
//! - [`request`] - `CommitRequest` and its `FileChange`s
//! - [`conflict`] - Structured conflict report
//! - [`error`] - `CommitError`
//! - [`engine`] - `CommitEngine`: divergence check, fast path, merge attempt
//!
//! # Example
//!
//! ```ignore
//! use stagehand::commit::{CommitDetails, CommitEngine, CommitRequest, FileChange};
//!
//! let request = CommitRequest::single(
//!     CommitDetails::new(Signature::new("Jane", "jane@example.com"), "Add story"),
//!     FileChange::create(RepoPath::new("docs/story.txt")?, "Lorem ipsum"),
//! );
//! let oid = CommitEngine::new(&git).commit(&request, Some(&tip))?;
//! ```

pub mod conflict;
pub mod engine;
pub mod error;
pub mod request;

pub use conflict::ConflictEntry;
pub use engine::{CommitEngine, FALLBACK_BRANCH};
pub use error::CommitError;
pub use request::{CommitDetails, CommitRequest, ContentEncoding, FileChange, NormalizedRequest};
