//! commit::engine
//!
//! The commit/merge engine.
//!
//! # Algorithm
//!
//! ```text
//! Start -> DivergenceCheck -> FastPath     -> Committed
//!                          \-> MergeAttempt -> Committed | Conflicted
//! ```
//!
//! 1. **Divergence check.** Read the branch tip. Without a `previous_head`,
//!    without a tip, or when both agree, take the fast path.
//! 2. **Fast path.** Stage every change on top of the tip's tree, write the
//!    tree, write a commit whose parent is the tip, then advance the branch
//!    with a compare-and-swap against the tip.
//! 3. **Merge attempt.** Build the caller's commit on top of the stale
//!    `previous_head` via a short-lived ref, three-way merge it with the
//!    tip, and either commit the merged tree on top of the tip or report
//!    conflicts. A clean merge is still rejected when the request updates a
//!    file the branch has since deleted.
//!
//! # Invariants
//!
//! - The branch ref is the last thing written; a failure at any earlier step
//!   leaves it untouched
//! - No ephemeral ref outlives a call
//! - The engine never locks; callers serialize writers per repository

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::conflict::ConflictEntry;
use super::error::CommitError;
use super::request::{CommitRequest, FileChange, NormalizedRequest};
use crate::core::config::Config;
use crate::core::types::{Oid, RefName};
use crate::git::{Git, GitError, MergeIndex, MergeLabels, StagingIndex};

/// Branch used when neither the request, the configuration nor `HEAD`
/// names one.
pub const FALLBACK_BRANCH: &str = "master";

/// A ref that exists only for the duration of a merge attempt.
///
/// Deleted by [`EphemeralRef::remove`], or on drop if that was never
/// reached.
struct EphemeralRef<'a> {
    git: &'a Git,
    name: RefName,
    removed: bool,
}

impl<'a> EphemeralRef<'a> {
    fn create(git: &'a Git, name: RefName, target: &Oid) -> Result<Self, GitError> {
        git.create_ref(&name, target, "stagehand: merge attempt")?;
        debug!(refname = %name, target = %target, "created ephemeral ref");
        Ok(Self {
            git,
            name,
            removed: false,
        })
    }

    fn name(&self) -> &RefName {
        &self.name
    }

    fn remove(mut self) -> Result<(), GitError> {
        self.removed = true;
        self.git.delete_ref(&self.name)?;
        debug!(refname = %self.name, "deleted ephemeral ref");
        Ok(())
    }
}

impl Drop for EphemeralRef<'_> {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = self.git.delete_ref(&self.name) {
            warn!(refname = %self.name, error = %e, "failed to delete ephemeral ref");
        }
    }
}

/// Creates commits from [`CommitRequest`]s.
///
/// # Example
///
/// ```ignore
/// let engine = CommitEngine::new(&git);
/// match engine.commit(&request, Some(&previous_head)) {
///     Ok(oid) => println!("committed {}", oid),
///     Err(CommitError::HeadChanged { conflicts, .. }) => { /* re-read, retry */ }
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct CommitEngine<'a> {
    git: &'a Git,
    config: Config,
}

impl<'a> CommitEngine<'a> {
    /// An engine using default settings.
    pub fn new(git: &'a Git) -> Self {
        Self::with_config(git, Config::default())
    }

    /// An engine using the given configuration.
    pub fn with_config(git: &'a Git, config: Config) -> Self {
        Self { git, config }
    }

    /// Create one commit from `request`.
    ///
    /// `previous_head` is the branch tip the caller built the request
    /// against. When it no longer matches the tip, the engine tries to
    /// merge the request onto the new tip.
    ///
    /// # Errors
    ///
    /// - [`CommitError::InvalidRequest`] / [`CommitError::InvalidPath`] for
    ///   requests that cannot apply
    /// - [`CommitError::HeadChanged`] when the branch moved and the request
    ///   conflicts with what landed
    /// - [`CommitError::Git`] for store failures, including a lost race on
    ///   the final ref update
    pub fn commit(
        &self,
        request: &CommitRequest,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        request.validate()?;
        let now: DateTime<FixedOffset> = Utc::now().into();
        let normalized = request.normalize(&self.default_branch()?, now)?;

        let tip = self.git.try_resolve_ref(&normalized.branch)?;
        debug!(
            branch = %normalized.branch,
            tip = ?tip.as_ref().map(Oid::as_str),
            previous_head = ?previous_head.map(Oid::as_str),
            "divergence check"
        );

        match (previous_head, tip.as_ref()) {
            (Some(previous), Some(tip)) if previous != tip => {
                self.merge_attempt(request, &normalized, previous, tip)
            }
            _ => self.fast_path(&normalized, tip.as_ref()),
        }
    }

    /// The branch used when a request names none.
    ///
    /// Configured `default_branch`, then the target of `HEAD`, then
    /// [`FALLBACK_BRANCH`].
    pub fn default_branch(&self) -> Result<String, CommitError> {
        if let Some(branch) = self.config.default_branch() {
            return Ok(branch.to_string());
        }
        Ok(match self.git.head_target()? {
            Some(target) => target.to_string(),
            None => FALLBACK_BRANCH.to_string(),
        })
    }

    fn fast_path(&self, request: &NormalizedRequest, tip: Option<&Oid>) -> Result<Oid, CommitError> {
        debug!(branch = %request.branch, changes = request.files.len(), "fast path");

        let mut index = StagingIndex::new(self.git, self.config.placeholder())?;
        if let Some(tip) = tip {
            index.read_tree(&self.git.commit_tree(tip)?)?;
        }
        for change in &request.files {
            apply(&mut index, change)?;
        }
        let tree = index.write_tree()?;

        let parents: Vec<Oid> = tip.into_iter().cloned().collect();
        let commit = self.write_commit(request, &tree, &parents)?;
        if request.update_ref {
            self.advance(request, &commit, tip)?;
        }

        Ok(commit)
    }

    fn merge_attempt(
        &self,
        original: &CommitRequest,
        request: &NormalizedRequest,
        previous_head: &Oid,
        tip: &Oid,
    ) -> Result<Oid, CommitError> {
        debug!(
            branch = %request.branch,
            tip = %tip,
            previous_head = %previous_head,
            "branch moved, attempting merge"
        );

        let user_commit = self.user_commit(request, previous_head)?;
        let merge = self.git.merge_commits(tip, &user_commit)?;

        if merge.has_conflicts() {
            let conflicts = self.structural_conflicts(&merge, request)?;
            return Err(head_changed(conflicts, original));
        }

        let conflicts = self.deleted_on_branch(request, tip, &user_commit)?;
        if !conflicts.is_empty() {
            return Err(head_changed(conflicts, original));
        }

        let tree = merge.write_tree()?;
        let commit = self.write_commit(request, &tree, std::slice::from_ref(tip))?;
        if request.update_ref {
            self.advance(request, &commit, Some(tip))?;
        }

        Ok(commit)
    }

    /// Build the request on top of `previous_head` without touching any
    /// persistent ref.
    fn user_commit(&self, request: &NormalizedRequest, previous_head: &Oid) -> Result<Oid, CommitError> {
        let ephemeral = EphemeralRef::create(self.git, self.ephemeral_ref_name()?, previous_head)?;

        let result = self.git.resolve_ref(ephemeral.name()).map_err(CommitError::from).and_then(|base| {
            let staged = request.retarget(ephemeral.name().clone(), false);
            self.fast_path(&staged, Some(&base))
        });
        let cleanup = ephemeral.remove();

        let commit = result?;
        cleanup?;
        Ok(commit)
    }

    fn ephemeral_ref_name(&self) -> Result<RefName, CommitError> {
        let prefix = RefName::new(self.config.merge_ref_prefix()).map_err(GitError::from)?;
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let name = format!("{}_{}", nanos, Uuid::new_v4().simple());
        let name = prefix.join(&name).map_err(GitError::from)?;
        Ok(name)
    }

    fn structural_conflicts(
        &self,
        merge: &MergeIndex<'_>,
        request: &NormalizedRequest,
    ) -> Result<Vec<ConflictEntry>, CommitError> {
        let labels = MergeLabels {
            ancestor: self.config.ancestor_label(),
            ours: request.branch.shorthand(),
            theirs: &request.message,
        };

        let mut entries = Vec::new();
        for conflict in merge.conflicts()? {
            let merge_info = merge.merge_file(&conflict, labels)?;
            entries.push(ConflictEntry::structural(conflict, merge_info));
        }

        debug!(conflicts = entries.len(), "merge produced structural conflicts");
        Ok(entries)
    }

    /// Updates of files that the tip's own commit deleted.
    ///
    /// The three-way merge resolves an unchanged-vs-deleted file by taking
    /// the deletion, which would silently drop the caller's update. Only
    /// paths present in the tip's first parent and absent from the tip
    /// count as deleted.
    fn deleted_on_branch(
        &self,
        request: &NormalizedRequest,
        tip: &Oid,
        user_commit: &Oid,
    ) -> Result<Vec<ConflictEntry>, CommitError> {
        let Some(tip_parent) = self.git.commit_parents(tip)?.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for path in request.files.iter().filter_map(FileChange::guarded_path) {
            if self.git.blob_at(tip, path)?.is_some() {
                continue;
            }
            let Some(ancestor) = self.git.blob_at(&tip_parent, path)? else {
                continue;
            };
            let theirs = self.git.blob_at(user_commit, path)?;
            entries.push(ConflictEntry::deleted_on_branch(path.clone(), ancestor, theirs));
        }

        if !entries.is_empty() {
            debug!(conflicts = entries.len(), "request updates files deleted on the branch");
        }
        Ok(entries)
    }

    fn write_commit(
        &self,
        request: &NormalizedRequest,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, CommitError> {
        let commit = self.git.create_commit(
            tree,
            parents,
            &request.author,
            &request.committer,
            &request.message,
        )?;
        debug!(commit = %commit, tree = %tree, parents = parents.len(), "wrote commit");
        Ok(commit)
    }

    fn advance(&self, request: &NormalizedRequest, commit: &Oid, expected: Option<&Oid>) -> Result<(), CommitError> {
        let summary = request.message.lines().next().unwrap_or_default();
        self.git.update_ref_cas(
            &request.branch,
            commit,
            expected,
            &format!("stagehand: {}", summary),
        )?;
        debug!(branch = %request.branch, commit = %commit, "advanced branch");
        Ok(())
    }
}

fn apply(index: &mut StagingIndex<'_>, change: &FileChange) -> Result<(), CommitError> {
    let content = change.content_bytes()?;
    let content = content.as_deref();
    match change {
        FileChange::Create { path, .. } => index.create(path, content.unwrap_or_default())?,
        FileChange::Update { path, .. } => index.update(path, content.unwrap_or_default())?,
        FileChange::Rename {
            path,
            previous_path,
        } => index.move_file(path, previous_path, None)?,
        FileChange::RenameAndUpdate {
            path,
            previous_path,
            ..
        } => index.move_file(path, previous_path, content)?,
        FileChange::Remove { path } => index.delete(path)?,
        FileChange::Mkdir { path } => index.create_dir(path)?,
    }
    Ok(())
}

fn head_changed(conflicts: Vec<ConflictEntry>, original: &CommitRequest) -> CommitError {
    CommitError::HeadChanged {
        conflicts,
        request: Box::new(original.clone()),
    }
}
