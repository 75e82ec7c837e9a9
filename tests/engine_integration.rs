//! Integration tests for the commit/merge engine.
//!
//! Every test runs against a real bare repository created in a temp
//! directory and drives it through the `Repository` facade.

use chrono::{DateTime, FixedOffset};
use tempfile::TempDir;

use stagehand::commit::{CommitDetails, CommitError, CommitRequest, FileChange};
use stagehand::core::lock::{LockError, RepoLock};
use stagehand::core::types::{Oid, PathViolation, RepoPath, Signature};
use stagehand::repo::{RepoError, Repository};

/// Test fixture: an empty bare repository whose default branch is `master`.
struct TestRepo {
    _dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let repo = Repository::create(&dir.path().join("repo.git")).expect("failed to create repo");
        repo.set_default_branch("master").unwrap();
        Self { _dir: dir, repo }
    }

    /// A repository whose `master` already holds `files`.
    fn with_files(files: &[(&str, &str)]) -> Self {
        let test = Self::new();
        let changes = files
            .iter()
            .map(|(path, content)| FileChange::create(p(path), *content))
            .collect();
        test.commit(changes, None).unwrap();
        test
    }

    fn commit(&self, files: Vec<FileChange>, previous_head: Option<&Oid>) -> Result<Oid, CommitError> {
        self.commit_as(details("Test commit"), files, previous_head)
    }

    fn commit_as(
        &self,
        details: CommitDetails,
        files: Vec<FileChange>,
        previous_head: Option<&Oid>,
    ) -> Result<Oid, CommitError> {
        self.repo
            .commit_multichange(&CommitRequest::new(details, files), previous_head)
    }

    fn tip(&self) -> Oid {
        self.repo
            .branch_sha("master")
            .unwrap()
            .expect("master should exist")
    }

    fn read(&self, revision: &str, path: &str) -> Option<String> {
        self.repo
            .blob(revision, path)
            .unwrap()
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    fn paths(&self, commit: &Oid) -> Vec<String> {
        self.repo
            .git()
            .tree_paths(commit)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn parents(&self, commit: &Oid) -> Vec<Oid> {
        self.repo.git().commit_parents(commit).unwrap()
    }

    fn ephemeral_refs(&self) -> usize {
        self.repo
            .git()
            .list_refs_by_prefix("refs/merges/")
            .unwrap()
            .len()
    }
}

fn p(path: &str) -> RepoPath {
    RepoPath::new(path).unwrap()
}

fn details(message: &str) -> CommitDetails {
    CommitDetails::new(Signature::new("Test User", "test@example.com"), message)
}

fn fixed_time() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap()
}

mod fast_path {
    use super::*;

    #[test]
    fn first_commit_is_a_root_commit() {
        let test = TestRepo::new();
        assert!(test.repo.is_empty().unwrap());

        let oid = test
            .commit(vec![FileChange::create(p("docs/story.txt"), "Lorem ipsum")], None)
            .unwrap();

        assert_eq!(test.tip(), oid);
        assert!(test.parents(&oid).is_empty());
        assert_eq!(test.read("master", "docs/story.txt").as_deref(), Some("Lorem ipsum"));
        assert!(!test.repo.is_empty().unwrap());
    }

    #[test]
    fn commit_records_details() {
        let test = TestRepo::with_files(&[("a.txt", "a")]);
        let author = Signature::new("Author", "author@example.com").at(fixed_time());
        let committer = Signature::new("Committer", "committer@example.com");
        let details = CommitDetails {
            author: author.clone(),
            committer,
            message: "Edit a\n\nLonger body".to_string(),
            branch: None,
            update_ref: None,
        };

        let oid = test
            .commit_as(details, vec![FileChange::update(p("a.txt"), "b")], None)
            .unwrap();

        let info = test.repo.git().commit_info(&oid).unwrap();
        assert_eq!(info.author, author);
        assert_eq!(info.committer.name, "Committer");
        assert!(info.committer.time.is_some());
        assert_eq!(info.message, "Edit a\n\nLonger body");
    }

    #[test]
    fn all_operations_in_one_commit() {
        let test = TestRepo::with_files(&[
            ("keep.txt", "keep"),
            ("edit.txt", "old"),
            ("move.txt", "moving"),
            ("rewrite.txt", "draft"),
            ("gone.txt", "bye"),
        ]);
        let before = test.tip();

        let oid = test
            .commit(
                vec![
                    FileChange::create(p("new/file.txt"), "fresh"),
                    FileChange::update(p("edit.txt"), "new"),
                    FileChange::rename(p("moved/move.txt"), p("move.txt")),
                    FileChange::rename_and_update(p("final.txt"), p("rewrite.txt"), "final"),
                    FileChange::remove(p("gone.txt")),
                    FileChange::mkdir(p("empty")),
                ],
                Some(&before),
            )
            .unwrap();

        assert_eq!(test.parents(&oid), vec![before]);
        assert_eq!(
            test.paths(&oid),
            vec![
                "edit.txt",
                "empty/.gitkeep",
                "final.txt",
                "keep.txt",
                "moved/move.txt",
                "new/file.txt",
            ]
        );
        assert_eq!(test.read("master", "edit.txt").as_deref(), Some("new"));
        assert_eq!(test.read("master", "moved/move.txt").as_deref(), Some("moving"));
        assert_eq!(test.read("master", "final.txt").as_deref(), Some("final"));
        assert_eq!(test.read("master", "empty/.gitkeep").as_deref(), Some(""));
    }

    #[test]
    fn changes_apply_in_order() {
        let test = TestRepo::new();
        let oid = test
            .commit(
                vec![
                    FileChange::create(p("a"), "one"),
                    FileChange::update(p("a"), "two"),
                    FileChange::rename(p("b"), p("a")),
                ],
                None,
            )
            .unwrap();

        assert_eq!(test.paths(&oid), vec!["b"]);
        assert_eq!(test.read("master", "b").as_deref(), Some("two"));
    }

    #[test]
    fn base64_content_is_decoded() {
        let test = TestRepo::new();
        test.commit(vec![FileChange::create(p("bin"), "AAEC/w==").base64()], None)
            .unwrap();
        assert_eq!(test.repo.blob("master", "bin").unwrap(), Some(vec![0, 1, 2, 255]));
    }

    #[test]
    fn previous_head_equal_to_tip_takes_fast_path() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let tip = test.tip();
        let oid = test
            .commit(vec![FileChange::update(p("a"), "2")], Some(&tip))
            .unwrap();
        assert_eq!(test.parents(&oid), vec![tip]);
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn missing_branch_gets_root_commit() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let master = test.tip();

        let oid = test
            .commit_as(
                details("Start feature").on_branch("feature"),
                vec![FileChange::create(p("b"), "2")],
                Some(&master),
            )
            .unwrap();

        assert!(test.parents(&oid).is_empty());
        assert_eq!(test.repo.branch_sha("feature").unwrap(), Some(oid.clone()));
        assert_eq!(test.paths(&oid), vec!["b"]);
        assert_eq!(test.tip(), master);
    }

    #[test]
    fn update_ref_false_leaves_branch() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let tip = test.tip();

        let oid = test
            .commit_as(
                details("Detached").update_ref(false),
                vec![FileChange::update(p("a"), "2")],
                None,
            )
            .unwrap();

        assert_eq!(test.tip(), tip);
        assert_eq!(test.parents(&oid), vec![tip]);
        assert_eq!(test.read(oid.as_str(), "a").as_deref(), Some("2"));
    }

    #[test]
    fn default_branch_follows_head() {
        let test = TestRepo::new();
        test.repo.set_default_branch("trunk").unwrap();
        assert_eq!(test.repo.default_branch().unwrap(), "trunk");

        let oid = test.commit(vec![FileChange::create(p("a"), "1")], None).unwrap();
        assert_eq!(test.repo.branch_sha("trunk").unwrap(), Some(oid));
        assert_eq!(test.repo.branch_sha("master").unwrap(), None);
    }

    #[test]
    fn identical_requests_give_identical_commits() {
        let run = || {
            let test = TestRepo::new();
            let identity = Signature::new("Test User", "test@example.com").at(fixed_time());
            let details = CommitDetails::new(identity, "Same");
            test.commit_as(
                details,
                vec![
                    FileChange::create(p("a/b.txt"), "x"),
                    FileChange::mkdir(p("c")),
                ],
                None,
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }
}

mod mkdir {
    use super::*;

    #[test]
    fn in_empty_repository() {
        let test = TestRepo::new();
        let oid = test
            .commit(vec![FileChange::mkdir(p("dir/with/subdir"))], None)
            .unwrap();

        assert!(test.parents(&oid).is_empty());
        assert_eq!(test.paths(&oid), vec!["dir/with/subdir/.gitkeep"]);
        assert_eq!(test.read("master", "dir/with/subdir/.gitkeep").as_deref(), Some(""));
    }

    #[test]
    fn existing_directory_is_rejected() {
        let test = TestRepo::with_files(&[("dir/file.txt", "x")]);
        let err = test
            .repo
            .mkdir(details("mkdir"), "dir", None)
            .unwrap_err();
        match err {
            CommitError::InvalidPath { path, violation } => {
                assert_eq!(path, "dir");
                assert_eq!(violation, PathViolation::DirectoryExists);
            }
            other => panic!("expected InvalidPath, got {other:?}"),
        }
    }

    #[test]
    fn over_existing_file_is_a_collision() {
        let test = TestRepo::with_files(&[("dir", "x")]);
        let err = test
            .repo
            .mkdir(details("mkdir"), "dir/sub", None)
            .unwrap_err();
        assert!(err.is_blob_name_collision());
        assert_eq!(
            err.to_string(),
            "invalid path 'dir/sub': directory 'dir' already exists as a file"
        );
    }
}

mod invalid_paths {
    use super::*;

    #[test]
    fn failure_is_atomic() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let tip = test.tip();

        let err = test
            .commit(
                vec![
                    FileChange::create(p("b"), "2"),
                    FileChange::update(p("missing"), "3"),
                ],
                None,
            )
            .unwrap_err();

        match err {
            CommitError::InvalidPath { path, violation } => {
                assert_eq!(path, "missing");
                assert_eq!(violation, PathViolation::FileNotFound);
            }
            other => panic!("expected InvalidPath, got {other:?}"),
        }
        assert_eq!(test.tip(), tip);
        assert!(!test.repo.path_exists("master", "b").unwrap());
    }

    #[test]
    fn create_over_existing_file() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let err = test.repo.create_file(details("dup"), "a", "2", None).unwrap_err();
        assert!(err.is_blob_name_collision());
        assert_eq!(err.to_string(), "invalid path 'a': a file with this name already exists");
    }

    #[test]
    fn create_under_a_file() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let err = test.repo.create_file(details("nested"), "a/b", "2", None).unwrap_err();
        assert!(err.is_blob_name_collision());
    }

    #[test]
    fn remove_directory_is_rejected() {
        let test = TestRepo::with_files(&[("dir/a", "1")]);
        let err = test.repo.remove_file(details("rm"), "dir", None).unwrap_err();
        assert!(matches!(
            err,
            CommitError::InvalidPath {
                violation: PathViolation::IsDirectory,
                ..
            }
        ));
    }

    #[test]
    fn rename_onto_existing_file() {
        let test = TestRepo::with_files(&[("a", "1"), ("b", "2")]);
        let err = test.repo.rename_file(details("mv"), "a", "b", None).unwrap_err();
        assert!(err.is_blob_name_collision());
        assert_eq!(test.read("master", "a").as_deref(), Some("1"));
    }

    #[test]
    fn malformed_path_is_rejected_before_staging() {
        let test = TestRepo::new();
        let err = test
            .repo
            .create_file(details("bad"), "a/../b", "x", None)
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::InvalidPath {
                violation: PathViolation::Malformed(_),
                ..
            }
        ));
        assert!(test.repo.is_empty().unwrap());
    }

    #[test]
    fn empty_request_is_invalid() {
        let test = TestRepo::new();
        let err = test.commit(vec![], None).unwrap_err();
        assert!(matches!(err, CommitError::InvalidRequest { .. }));
    }
}

mod merge {
    use super::*;

    const BASE: &str = "line1\nline2\nline3\n";

    #[test]
    fn disjoint_changes_merge_onto_tip() {
        let test = TestRepo::with_files(&[("a", "a"), ("b", "b")]);
        let base = test.tip();
        let concurrent = test
            .commit(vec![FileChange::update(p("a"), "a2")], Some(&base))
            .unwrap();

        let oid = test
            .commit(vec![FileChange::update(p("b"), "b2")], Some(&base))
            .unwrap();

        assert_eq!(test.tip(), oid);
        assert_eq!(test.parents(&oid), vec![concurrent]);
        assert_eq!(test.read("master", "a").as_deref(), Some("a2"));
        assert_eq!(test.read("master", "b").as_deref(), Some("b2"));
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn non_overlapping_edits_of_one_file_merge() {
        let text = "1\n2\n3\n4\n5\n6\n7\n";
        let test = TestRepo::with_files(&[("a", text)]);
        let base = test.tip();
        test.commit(vec![FileChange::update(p("a"), "one\n2\n3\n4\n5\n6\n7\n")], Some(&base))
            .unwrap();

        test.commit(vec![FileChange::update(p("a"), "1\n2\n3\n4\n5\n6\nseven\n")], Some(&base))
            .unwrap();

        assert_eq!(
            test.read("master", "a").as_deref(),
            Some("one\n2\n3\n4\n5\n6\nseven\n")
        );
    }

    #[test]
    fn overlapping_edits_report_conflict() {
        let test = TestRepo::with_files(&[("a", BASE), ("other", "x")]);
        let base = test.tip();
        test.commit(vec![FileChange::update(p("a"), "line1\nours\nline3\n")], Some(&base))
            .unwrap();
        let tip = test.tip();

        let request = CommitRequest::new(
            details("Edit a"),
            vec![
                FileChange::update(p("a"), "line1\ntheirs\nline3\n"),
                FileChange::remove(p("other")),
            ],
        );
        let err = test
            .repo
            .commit_multichange(&request, Some(&base))
            .unwrap_err();

        let CommitError::HeadChanged {
            conflicts,
            request: returned,
        } = err
        else {
            panic!("expected HeadChanged");
        };
        assert_eq!(*returned, request);
        assert_eq!(conflicts.len(), 1);

        let entry = &conflicts[0];
        assert_eq!(entry.path, p("a"));
        assert!(entry.ancestor.is_some());
        assert!(entry.ours.is_some());
        assert!(entry.theirs.is_some());

        let info = entry.merge_info.as_ref().expect("merge info");
        assert!(!info.automergeable);
        assert!(info.data.contains("<<<<<<< master"));
        assert!(info.data.contains("======="));
        assert!(info.data.contains(">>>>>>> Edit a"));
        assert!(info.data.contains("ours"));
        assert!(info.data.contains("theirs"));

        assert_eq!(test.tip(), tip);
        assert!(test.repo.path_exists("master", "other").unwrap());
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn modify_against_delete_is_structural() {
        let test = TestRepo::with_files(&[("a", "1\n")]);
        let base = test.tip();
        test.commit(vec![FileChange::remove(p("a"))], Some(&base)).unwrap();

        let err = test
            .commit(vec![FileChange::update(p("a"), "2\n")], Some(&base))
            .unwrap_err();

        let conflicts = err.conflicts().expect("HeadChanged");
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].ours.is_none());
        assert!(conflicts[0].theirs.is_some());
        assert!(conflicts[0].merge_info.is_none());
    }

    #[test]
    fn unchanged_update_of_deleted_file_is_rejected() {
        let test = TestRepo::with_files(&[("a", "same"), ("b", "b")]);
        let base = test.tip();
        test.commit(vec![FileChange::remove(p("a"))], Some(&base)).unwrap();
        let tip = test.tip();

        let err = test
            .commit(
                vec![
                    FileChange::update(p("a"), "same"),
                    FileChange::update(p("b"), "b2"),
                ],
                Some(&base),
            )
            .unwrap_err();

        let conflicts = err.conflicts().expect("HeadChanged");
        assert_eq!(conflicts.len(), 1);
        let entry = &conflicts[0];
        assert_eq!(entry.path, p("a"));
        assert!(entry.ours.is_none());
        assert!(entry.ancestor.is_some());
        assert_eq!(
            entry.theirs.as_ref().map(|b| b.oid.clone()),
            entry.ancestor.as_ref().map(|b| b.oid.clone())
        );
        assert!(entry.merge_info.is_none());
        assert_eq!(test.tip(), tip);
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn new_file_updated_in_same_request_merges() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let base = test.tip();
        let concurrent = test
            .commit(vec![FileChange::create(p("b"), "2")], Some(&base))
            .unwrap();

        let oid = test
            .commit(
                vec![
                    FileChange::create(p("fresh.txt"), "draft"),
                    FileChange::update(p("fresh.txt"), "final"),
                ],
                Some(&base),
            )
            .unwrap();

        assert_eq!(test.parents(&oid), vec![concurrent]);
        assert_eq!(test.read("master", "fresh.txt").as_deref(), Some("final"));
        assert_eq!(test.read("master", "b").as_deref(), Some("2"));
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn rename_and_update_of_deleted_file_is_rejected() {
        let test = TestRepo::with_files(&[("a", "original text of the file\n"), ("keep", "k")]);
        let base = test.tip();
        test.commit(vec![FileChange::remove(p("a"))], Some(&base)).unwrap();
        let tip = test.tip();

        let err = test
            .commit(
                vec![FileChange::rename_and_update(
                    p("b"),
                    p("a"),
                    "entirely unrelated\nreplacement content\nwith more lines\n",
                )],
                Some(&base),
            )
            .unwrap_err();

        let conflicts = err.conflicts().expect("HeadChanged");
        assert_eq!(conflicts.len(), 1);
        let entry = &conflicts[0];
        assert_eq!(entry.path, p("a"));
        assert!(entry.ancestor.is_some());
        assert!(entry.ours.is_none());
        assert!(entry.theirs.is_none());
        assert!(entry.merge_info.is_none());
        assert_eq!(test.tip(), tip);
        assert_eq!(test.ephemeral_refs(), 0);
    }

    #[test]
    fn both_sides_adding_same_path_conflict() {
        let test = TestRepo::with_files(&[("base", "x")]);
        let base = test.tip();
        test.commit(vec![FileChange::create(p("new"), "ours\n")], Some(&base))
            .unwrap();

        let err = test
            .commit(vec![FileChange::create(p("new"), "theirs\n")], Some(&base))
            .unwrap_err();

        let conflicts = err.conflicts().expect("HeadChanged");
        assert_eq!(conflicts.len(), 1);
        let entry = &conflicts[0];
        assert!(entry.ancestor.is_none());
        let info = entry.merge_info.as_ref().expect("merge info");
        assert!(info.data.contains("<<<<<<<"));
    }

    #[test]
    fn conflict_report_is_deterministic() {
        let run = || {
            let test = TestRepo::with_files(&[("a", BASE), ("b", BASE)]);
            let base = test.tip();
            test.commit(
                vec![
                    FileChange::update(p("b"), "x\nours\n"),
                    FileChange::update(p("a"), "x\nours\n"),
                ],
                Some(&base),
            )
            .unwrap();
            let err = test
                .commit(
                    vec![
                        FileChange::update(p("a"), "y\ntheirs\n"),
                        FileChange::update(p("b"), "y\ntheirs\n"),
                    ],
                    Some(&base),
                )
                .unwrap_err();
            err.conflicts().expect("HeadChanged").to_vec()
        };

        let first = run();
        assert_eq!(
            first.iter().map(|c| c.path.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(first, run());
    }

    #[test]
    fn merge_invalid_path_against_stale_head() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let base = test.tip();
        test.commit(vec![FileChange::create(p("b"), "2")], Some(&base)).unwrap();

        let err = test
            .commit(vec![FileChange::update(p("missing"), "x")], Some(&base))
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidPath { .. }));
        assert_eq!(test.ephemeral_refs(), 0);
    }
}

mod repository {
    use super::*;

    #[test]
    fn commit_locked_refuses_when_lock_held() {
        let test = TestRepo::new();
        let _held = RepoLock::acquire(test.repo.paths()).unwrap();

        let request = CommitRequest::single(details("locked"), FileChange::create(p("a"), "1"));
        let err = test.repo.commit_locked(&request, None).unwrap_err();
        assert!(matches!(err, RepoError::Lock(LockError::AlreadyLocked)));
        assert!(test.repo.is_empty().unwrap());
    }

    #[test]
    fn commit_locked_releases_lock() {
        let test = TestRepo::new();
        let request = CommitRequest::single(details("locked"), FileChange::create(p("a"), "1"));
        test.repo.commit_locked(&request, None).unwrap();
        assert!(RepoLock::try_acquire(test.repo.paths()).unwrap().is_some());
    }

    #[test]
    fn branches_and_tags() {
        let test = TestRepo::with_files(&[("a", "1")]);
        let tip = test.tip();

        assert_eq!(test.repo.create_branch("feature", "master").unwrap(), tip);
        assert_eq!(test.repo.branch_names().unwrap(), vec!["feature", "master"]);

        test.repo.create_tag("v1", "master", None).unwrap();
        let tagger = Signature::new("Tagger", "tagger@example.com");
        test.repo
            .create_tag("v2", "feature", Some(("Release 2", &tagger)))
            .unwrap();
        assert_eq!(test.repo.tag_names().unwrap(), vec!["v1", "v2"]);
        assert_eq!(test.read("v2", "a").as_deref(), Some("1"));

        test.repo.delete_tag("v1").unwrap();
        test.repo.delete_branch("feature").unwrap();
        assert_eq!(test.repo.tag_names().unwrap(), vec!["v2"]);
        assert_eq!(test.repo.branch_names().unwrap(), vec!["master"]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let test = TestRepo::with_files(&[("a", "1")]);
        assert!(matches!(
            test.repo.create_branch("bad..name", "master"),
            Err(RepoError::InvalidName(_))
        ));
        assert!(matches!(
            test.repo.create_tag("has space", "master", None),
            Err(RepoError::InvalidName(_))
        ));
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let test = TestRepo::with_files(&[("a", "1")]);
        test.repo.create_tag("v1", "master", None).unwrap();
        assert!(test.repo.create_tag("v1", "master", None).is_err());
    }

    #[test]
    fn blob_of_missing_path_is_none() {
        let test = TestRepo::with_files(&[("a", "1")]);
        assert_eq!(test.repo.blob("master", "nope").unwrap(), None);
        assert!(!test.repo.path_exists("master", "nope").unwrap());
    }

    #[test]
    fn open_missing_repository_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Repository::open(&dir.path().join("missing")).is_err());
    }
}
