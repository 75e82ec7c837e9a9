//! Stagehand - transactional multi-file commits for git repositories
//!
//! Stagehand turns a batch of file changes (create, update, rename, remove,
//! mkdir) into exactly one commit on a branch, without a working tree. When
//! the branch has moved since the caller last read it, the changes are
//! three-way merged onto the new tip, or rejected with a structured conflict
//! report.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer
//! - [`repo`] - `Repository` facade: create/open, conveniences, locked commits
//! - [`commit`] - Commit requests and the commit/merge engine
//! - [`core`] - Domain types, configuration, locking and storage paths
//! - [`git`] - Single interface for all Git operations
//!
//! # Correctness Invariants
//!
//! 1. A request produces one commit or none
//! 2. The branch ref is only moved by compare-and-swap against the tip that
//!    was read
//! 3. Temporary refs never outlive the call that created them

pub mod cli;
pub mod commit;
pub mod core;
pub mod git;
pub mod repo;
