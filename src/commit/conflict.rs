//! commit::conflict
//!
//! Structured conflict report returned when a moved branch cannot absorb a
//! request automatically.

use serde::{Deserialize, Serialize};

use crate::core::types::RepoPath;
use crate::git::{BlobEntry, MergeConflict, MergeText};

/// One conflicting path.
///
/// At least one of `ancestor`, `ours` and `theirs` is present. An absent
/// side means the file did not exist there. `merge_info` is only present
/// when both `ours` and `theirs` are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub path: RepoPath,
    /// The version both sides started from
    pub ancestor: Option<BlobEntry>,
    /// The version on the branch tip
    pub ours: Option<BlobEntry>,
    /// The version the request produced
    pub theirs: Option<BlobEntry>,
    /// Textual three-way merge with conflict markers
    pub merge_info: Option<MergeText>,
}

impl ConflictEntry {
    /// Entry for a structural merge conflict.
    pub fn structural(conflict: MergeConflict, merge_info: Option<MergeText>) -> Self {
        let merge_info = merge_info.filter(|_| conflict.ours.is_some() && conflict.theirs.is_some());
        Self {
            path: conflict.path,
            ancestor: conflict.ancestor,
            ours: conflict.ours,
            theirs: conflict.theirs,
            merge_info,
        }
    }

    /// Entry for an update of a file the branch has since deleted.
    ///
    /// `ancestor` is the file as it was before the deletion; `theirs` is
    /// absent when the request moved the file away.
    pub fn deleted_on_branch(path: RepoPath, ancestor: BlobEntry, theirs: Option<BlobEntry>) -> Self {
        Self {
            path,
            ancestor: Some(ancestor),
            ours: None,
            theirs,
            merge_info: None,
        }
    }
}
