//! git::index
//!
//! In-memory indexes for building and merging trees.
//!
//! - [`StagingIndex`] builds one tree from a starting tree plus a sequence
//!   of file operations. It never touches the repository's on-disk index
//!   or any ref; only blobs are written until [`StagingIndex::write_tree`].
//! - [`MergeIndex`] holds the result of a three-way commit merge: the
//!   merged tree and any structural conflicts.
//!
//! Both are single-use: `write_tree` consumes them.

use std::borrow::Cow;
use std::path::Path;

use thiserror::Error;

use super::interface::{from_git2_oid, to_git2, BlobEntry, Git, GitError, MergeText};
use crate::core::types::{Oid, PathViolation, RepoPath};

/// Mode of regular, non-executable files.
pub const DEFAULT_FILE_MODE: u32 = 0o100644;

/// Errors from staging operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The operation is inconsistent with the staged tree.
    #[error("invalid path '{path}': {violation}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// What is wrong with it
        violation: PathViolation,
    },

    /// Object-store failure.
    #[error(transparent)]
    Git(#[from] GitError),
}

fn invalid(path: impl Into<String>, violation: PathViolation) -> IndexError {
    IndexError::InvalidPath {
        path: path.into(),
        violation,
    }
}

fn index_entry(path: &str, id: git2::Oid, mode: u32) -> git2::IndexEntry {
    git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode,
        uid: 0,
        gid: 0,
        file_size: 0,
        id,
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// Rewrite CRLF line endings to LF. Content with a NUL byte is treated as
/// binary and left alone.
fn normalize_crlf(content: &[u8]) -> Cow<'_, [u8]> {
    if content.contains(&0) || !content.windows(2).any(|w| w == b"\r\n") {
        return Cow::Borrowed(content);
    }
    let mut out = Vec::with_capacity(content.len());
    let mut bytes = content.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' && bytes.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    Cow::Owned(out)
}

/// A tree under construction.
///
/// Operations validate against everything staged so far, so later
/// operations observe the effects of earlier ones.
///
/// # Example
///
/// ```ignore
/// let mut index = StagingIndex::new(&git, ".gitkeep")?;
/// index.read_tree(&git.commit_tree(&tip)?)?;
/// index.create(&RepoPath::new("docs/story.txt")?, b"Lorem ipsum")?;
/// index.delete(&RepoPath::new("old.txt")?)?;
/// let tree = index.write_tree()?;
/// ```
pub struct StagingIndex<'a> {
    git: &'a Git,
    index: git2::Index,
    placeholder: String,
    autocrlf: bool,
}

impl<'a> StagingIndex<'a> {
    /// Create an empty staging index.
    ///
    /// `placeholder` is the file name `create_dir` writes into new
    /// directories.
    pub fn new(git: &'a Git, placeholder: &str) -> Result<Self, IndexError> {
        let index = git2::Index::new().map_err(|e| GitError::from_git2(e, "new index"))?;
        Ok(Self {
            git,
            index,
            placeholder: placeholder.to_string(),
            autocrlf: git.autocrlf(),
        })
    }

    /// Load an existing tree as the starting point.
    pub fn read_tree(&mut self, tree: &Oid) -> Result<(), IndexError> {
        let tree_obj = self
            .git
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;
        self.index
            .read_tree(&tree_obj)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;
        Ok(())
    }

    /// Add a new file.
    ///
    /// Fails if a file already exists at `path`, if `path` is a directory,
    /// or if one of its parent directories is a file.
    pub fn create(&mut self, path: &RepoPath, content: &[u8]) -> Result<(), IndexError> {
        if self.file_entry(path.as_str()).is_some() {
            return Err(invalid(path.as_str(), PathViolation::FileExists));
        }
        self.check_parents(path)?;
        if self.is_directory(path) {
            return Err(invalid(path.as_str(), PathViolation::IsDirectory));
        }

        let blob = self.write_content(content)?;
        self.add(path, blob, DEFAULT_FILE_MODE)
    }

    /// Replace the content of an existing file, keeping its mode.
    pub fn update(&mut self, path: &RepoPath, content: &[u8]) -> Result<(), IndexError> {
        let existing = self.existing_file(path)?;
        let blob = self.write_content(content)?;
        self.add(path, blob, existing.mode)
    }

    /// Move a file from `previous_path` to `path`.
    ///
    /// Without `content` the blob staged at `previous_path` is carried
    /// over. The mode of the moved file is kept either way.
    pub fn move_file(
        &mut self,
        path: &RepoPath,
        previous_path: &RepoPath,
        content: Option<&[u8]>,
    ) -> Result<(), IndexError> {
        let previous = self.existing_file(previous_path)?;
        if self.file_entry(path.as_str()).is_some() {
            return Err(invalid(path.as_str(), PathViolation::FileExists));
        }

        self.remove(previous_path)?;
        self.check_parents(path)?;
        if self.is_directory(path) {
            return Err(invalid(path.as_str(), PathViolation::IsDirectory));
        }

        let blob = match content {
            Some(content) => self.write_content(content)?,
            None => previous.id,
        };
        self.add(path, blob, previous.mode)
    }

    /// Remove a file.
    pub fn delete(&mut self, path: &RepoPath) -> Result<(), IndexError> {
        self.existing_file(path)?;
        self.remove(path)
    }

    /// Create a directory (and any missing parents) by writing an empty
    /// placeholder file into it.
    ///
    /// Fails if `path` or one of its parents is a file, or if `path` is
    /// already a non-empty directory.
    pub fn create_dir(&mut self, path: &RepoPath) -> Result<(), IndexError> {
        if self.file_entry(path.as_str()).is_some() {
            return Err(invalid(
                path.as_str(),
                PathViolation::DirectoryExistsAsFile {
                    directory: path.to_string(),
                },
            ));
        }
        self.check_parents(path)?;
        if self.is_directory(path) {
            return Err(invalid(path.as_str(), PathViolation::DirectoryExists));
        }

        let marker = path
            .join(&self.placeholder)
            .map_err(|e| invalid(path.as_str(), PathViolation::Malformed(e.to_string())))?;
        let blob = self.write_content(b"")?;
        self.add(&marker, blob, DEFAULT_FILE_MODE)
    }

    /// Paths currently staged, in index order.
    pub fn paths(&self) -> Vec<String> {
        self.index
            .iter()
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect()
    }

    /// Persist the staged tree and return its id.
    ///
    /// Identical staged content always yields the same tree id.
    pub fn write_tree(mut self) -> Result<Oid, IndexError> {
        let oid = self
            .index
            .write_tree_to(&self.git.repo)
            .map_err(|e| GitError::from_git2(e, "write tree"))?;
        Ok(from_git2_oid(oid)?)
    }

    fn file_entry(&self, path: &str) -> Option<git2::IndexEntry> {
        self.index.get_path(Path::new(path), 0)
    }

    fn existing_file(&self, path: &RepoPath) -> Result<git2::IndexEntry, IndexError> {
        match self.file_entry(path.as_str()) {
            Some(entry) => Ok(entry),
            None if self.is_directory(path) => {
                Err(invalid(path.as_str(), PathViolation::IsDirectory))
            }
            None => Err(invalid(path.as_str(), PathViolation::FileNotFound)),
        }
    }

    fn is_directory(&self, path: &RepoPath) -> bool {
        let prefix = format!("{}/", path);
        self.index
            .iter()
            .any(|entry| entry.path.starts_with(prefix.as_bytes()))
    }

    fn check_parents(&self, path: &RepoPath) -> Result<(), IndexError> {
        match path.ancestors().find(|dir| self.file_entry(dir).is_some()) {
            Some(dir) => Err(invalid(
                path.as_str(),
                PathViolation::DirectoryExistsAsFile {
                    directory: dir.to_string(),
                },
            )),
            None => Ok(()),
        }
    }

    fn write_content(&self, content: &[u8]) -> Result<git2::Oid, IndexError> {
        let content = if self.autocrlf {
            normalize_crlf(content)
        } else {
            Cow::Borrowed(content)
        };
        self.git
            .repo
            .blob(&content)
            .map_err(|e| IndexError::from(GitError::from_git2(e, "write blob")))
    }

    fn add(&mut self, path: &RepoPath, blob: git2::Oid, mode: u32) -> Result<(), IndexError> {
        self.index
            .add(&index_entry(path.as_str(), blob, mode))
            .map_err(|e| GitError::from_git2(e, path.as_str()))?;
        Ok(())
    }

    fn remove(&mut self, path: &RepoPath) -> Result<(), IndexError> {
        self.index
            .remove_path(Path::new(path.as_str()))
            .map_err(|e| GitError::from_git2(e, path.as_str()))?;
        Ok(())
    }
}

/// One structurally conflicted path of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// The conflicted path
    pub path: RepoPath,
    /// Stage 1: the common ancestor's version
    pub ancestor: Option<BlobEntry>,
    /// Stage 2: our version
    pub ours: Option<BlobEntry>,
    /// Stage 3: their version
    pub theirs: Option<BlobEntry>,
}

/// Labels written into conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'l> {
    /// Label of the common ancestor section
    pub ancestor: &'l str,
    /// Label of our section
    pub ours: &'l str,
    /// Label of their section
    pub theirs: &'l str,
}

/// The outcome of a three-way commit merge.
pub struct MergeIndex<'a> {
    git: &'a Git,
    index: git2::Index,
}

impl<'a> MergeIndex<'a> {
    pub(super) fn new(git: &'a Git, index: git2::Index) -> Self {
        Self { git, index }
    }

    /// Whether the merge left any structural conflicts.
    pub fn has_conflicts(&self) -> bool {
        self.index.has_conflicts()
    }

    /// Structural conflicts, sorted by path.
    pub fn conflicts(&self) -> Result<Vec<MergeConflict>, IndexError> {
        let conflicts = self
            .index
            .conflicts()
            .map_err(|e| GitError::from_git2(e, "read conflicts"))?;

        let mut result = Vec::new();
        for conflict in conflicts {
            let conflict = conflict.map_err(|e| GitError::from_git2(e, "read conflicts"))?;
            let ancestor = conflict.ancestor.as_ref().map(blob_entry).transpose()?;
            let ours = conflict.our.as_ref().map(blob_entry).transpose()?;
            let theirs = conflict.their.as_ref().map(blob_entry).transpose()?;

            let Some(path) = [&ours, &theirs, &ancestor]
                .into_iter()
                .flatten()
                .map(|entry| entry.path.clone())
                .next()
            else {
                continue;
            };

            result.push(MergeConflict {
                path,
                ancestor,
                ours,
                theirs,
            });
        }
        result.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(result)
    }

    /// Textual three-way merge of one conflicted path.
    ///
    /// Returns `None` unless both our and their versions exist. A missing
    /// ancestor is merged as an empty file.
    pub fn merge_file(
        &self,
        conflict: &MergeConflict,
        labels: MergeLabels<'_>,
    ) -> Result<Option<MergeText>, IndexError> {
        let (Some(ours), Some(theirs)) = (&conflict.ours, &conflict.theirs) else {
            return Ok(None);
        };

        let ancestor = match &conflict.ancestor {
            Some(entry) => index_entry(entry.path.as_str(), to_git2(&entry.oid)?, entry.mode),
            None => {
                let empty = self
                    .git
                    .repo
                    .blob(b"")
                    .map_err(|e| GitError::from_git2(e, "write blob"))?;
                index_entry(ours.path.as_str(), empty, ours.mode)
            }
        };
        let our_entry = index_entry(ours.path.as_str(), to_git2(&ours.oid)?, ours.mode);
        let their_entry = index_entry(theirs.path.as_str(), to_git2(&theirs.oid)?, theirs.mode);

        let mut opts = git2::MergeFileOptions::new();
        opts.ancestor_label(labels.ancestor)
            .our_label(labels.ours)
            .their_label(labels.theirs);

        let merged = self
            .git
            .repo
            .merge_file_from_index(&ancestor, &our_entry, &their_entry, Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, conflict.path.as_str()))?;

        Ok(Some(MergeText {
            automergeable: merged.is_automergeable(),
            path: merged.path().map(String::from),
            filemode: merged.mode(),
            data: String::from_utf8_lossy(merged.content()).into_owned(),
        }))
    }

    /// Persist the merged tree and return its id.
    pub fn write_tree(mut self) -> Result<Oid, IndexError> {
        let oid = self
            .index
            .write_tree_to(&self.git.repo)
            .map_err(|e| GitError::from_git2(e, "write merged tree"))?;
        Ok(from_git2_oid(oid)?)
    }
}

fn blob_entry(entry: &git2::IndexEntry) -> Result<BlobEntry, IndexError> {
    let path = String::from_utf8_lossy(&entry.path);
    let path = RepoPath::new(path.as_ref()).map_err(GitError::from)?;
    Ok(BlobEntry {
        path,
        oid: from_git2_oid(entry.id)?,
        mode: entry.mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Git) {
        let temp = TempDir::new().unwrap();
        let git = Git::init_bare(temp.path()).unwrap();
        (temp, git)
    }

    fn p(path: &str) -> RepoPath {
        RepoPath::new(path).unwrap()
    }

    fn violation(result: Result<(), IndexError>) -> PathViolation {
        match result {
            Err(IndexError::InvalidPath { violation, .. }) => violation,
            other => panic!("expected InvalidPath, got {other:?}"),
        }
    }

    mod staging {
        use super::*;

        #[test]
        fn create_then_duplicate_fails() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("a.txt"), b"one").unwrap();
            assert_eq!(
                violation(index.create(&p("a.txt"), b"two")),
                PathViolation::FileExists
            );
        }

        #[test]
        fn create_under_file_fails() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("a"), b"file").unwrap();
            assert_eq!(
                violation(index.create(&p("a/b/c.txt"), b"x")),
                PathViolation::DirectoryExistsAsFile {
                    directory: "a".into()
                }
            );
        }

        #[test]
        fn create_over_directory_fails() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("dir/inner.txt"), b"x").unwrap();
            assert_eq!(
                violation(index.create(&p("dir"), b"x")),
                PathViolation::IsDirectory
            );
        }

        #[test]
        fn update_missing_fails() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            assert_eq!(
                violation(index.update(&p("nope.txt"), b"x")),
                PathViolation::FileNotFound
            );
            index.create(&p("dir/f"), b"x").unwrap();
            assert_eq!(
                violation(index.update(&p("dir"), b"x")),
                PathViolation::IsDirectory
            );
        }

        #[test]
        fn move_carries_staged_blob() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("old.txt"), b"content").unwrap();
            index.move_file(&p("new/name.txt"), &p("old.txt"), None).unwrap();
            assert_eq!(index.paths(), vec!["new/name.txt".to_string()]);
        }

        #[test]
        fn move_errors() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            assert_eq!(
                violation(index.move_file(&p("b"), &p("a"), None)),
                PathViolation::FileNotFound
            );

            index.create(&p("a"), b"1").unwrap();
            index.create(&p("b"), b"2").unwrap();
            assert_eq!(
                violation(index.move_file(&p("b"), &p("a"), Some(b"3"))),
                PathViolation::FileExists
            );
        }

        #[test]
        fn delete_missing_fails() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            assert_eq!(
                violation(index.delete(&p("ghost"))),
                PathViolation::FileNotFound
            );
        }

        #[test]
        fn create_dir_writes_placeholder() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".keep").unwrap();
            index.create_dir(&p("dir/with/subdir")).unwrap();
            assert_eq!(index.paths(), vec!["dir/with/subdir/.keep".to_string()]);
        }

        #[test]
        fn create_dir_collisions() {
            let (_t, git) = repo();
            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("file"), b"x").unwrap();
            index.create(&p("full/a.txt"), b"x").unwrap();

            assert_eq!(
                violation(index.create_dir(&p("file"))),
                PathViolation::DirectoryExistsAsFile {
                    directory: "file".into()
                }
            );
            assert_eq!(
                violation(index.create_dir(&p("file/sub"))),
                PathViolation::DirectoryExistsAsFile {
                    directory: "file".into()
                }
            );
            assert_eq!(
                violation(index.create_dir(&p("full"))),
                PathViolation::DirectoryExists
            );
        }

        #[test]
        fn write_tree_is_content_addressed() {
            let (_t, git) = repo();
            let build = |order: &[(&str, &str)]| {
                let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
                for (path, content) in order {
                    index.create(&p(path), content.as_bytes()).unwrap();
                }
                index.write_tree().unwrap()
            };

            let first = build(&[("a", "1"), ("b/c", "2")]);
            let second = build(&[("b/c", "2"), ("a", "1")]);
            assert_eq!(first, second);
        }

        #[test]
        fn read_tree_then_update_keeps_mode() {
            let (_t, git) = repo();

            // Seed a tree holding an executable file
            let mut seed = git2::Index::new().unwrap();
            let blob = git.repo.blob(b"#!/bin/sh\n").unwrap();
            seed.add(&index_entry("run.sh", blob, 0o100755)).unwrap();
            let tree = from_git2_oid(seed.write_tree_to(&git.repo).unwrap()).unwrap();

            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.read_tree(&tree).unwrap();
            index.update(&p("run.sh"), b"#!/bin/sh\necho hi\n").unwrap();
            index.move_file(&p("bin/run.sh"), &p("run.sh"), None).unwrap();

            let entry = index.file_entry("bin/run.sh").unwrap();
            assert_eq!(entry.mode, 0o100755);
        }
    }

    mod crlf {
        use super::*;

        #[test]
        fn rewrites_text() {
            assert_eq!(normalize_crlf(b"a\r\nb\r\n").as_ref(), b"a\nb\n");
        }

        #[test]
        fn lone_cr_kept() {
            assert_eq!(normalize_crlf(b"a\rb\r\n").as_ref(), b"a\rb\n");
        }

        #[test]
        fn binary_untouched() {
            let binary = b"\0\r\n";
            assert!(matches!(normalize_crlf(binary), Cow::Borrowed(_)));
        }

        #[test]
        fn applied_when_configured() {
            let (_t, git) = repo();
            git.repo
                .config()
                .unwrap()
                .set_str("core.autocrlf", "true")
                .unwrap();

            let mut index = StagingIndex::new(&git, ".gitkeep").unwrap();
            index.create(&p("win.txt"), b"line\r\n").unwrap();
            let entry = index.file_entry("win.txt").unwrap();
            let blob = git.read_blob(&from_git2_oid(entry.id).unwrap()).unwrap();
            assert_eq!(blob, b"line\n");
        }
    }
}
