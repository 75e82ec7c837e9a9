//! core
//!
//! Core domain types, configuration, and storage plumbing for stagehand.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, RepoPath, Signature, etc.
//! - [`config`] - Configuration schema and loading
//! - [`lock`] - Exclusive per-repository commit lock
//! - [`paths`] - Centralized path routing for stagehand storage
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod lock;
pub mod paths;
pub mod types;
