//! git
//!
//! Single interface for all object-store operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. All repository reads and
//! writes flow through it and no other module imports `git2`. We use the
//! `git2` crate exclusively (no shelling out to the git CLI).
//!
//! # Responsibilities
//!
//! - Repository opening and initialization
//! - Ref operations (resolve, create, CAS update, delete)
//! - Object operations (blobs, trees, commits)
//! - In-memory tree staging ([`StagingIndex`])
//! - Three-way commit merges and text merges ([`MergeIndex`])
//! - Branch and tag management
//!
//! # Invariants
//!
//! - The final advance of a branch ref is always a compare-and-swap
//! - No other module calls git2 directly
//! - All operations return strong types (Oid, BranchName, RefName, RepoPath)

mod index;
mod interface;

pub use index::{
    IndexError, MergeConflict, MergeIndex, MergeLabels, StagingIndex, DEFAULT_FILE_MODE,
};
pub use interface::{BlobEntry, CommitInfo, Git, GitError, MergeText, RefEntry, RepoInfo};
