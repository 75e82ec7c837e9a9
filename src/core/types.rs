//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`RefName`] - Validated Git reference name
//! - [`RepoPath`] - Normalized repository-relative file path
//! - [`Signature`] - Author/committer identity with an optional timestamp
//! - [`PathViolation`] - Why a path cannot be staged against the current tree
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use stagehand::core::types::{BranchName, Oid, RefName, RepoPath};
//!
//! let branch = BranchName::new("feature/my-branch").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::for_branch(&branch);
//! let path = RepoPath::new("/docs//story.txt").unwrap();
//! assert_eq!(path.as_str(), "docs/story.txt");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! assert!(RepoPath::new("../escape").is_err());
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Characters git never accepts in ref names.
const INVALID_REF_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@`
///
/// # Example
///
/// ```
/// use stagehand::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        if name.starts_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '/'".into(),
            ));
        }

        validate_ref_body(name).map_err(TypeError::InvalidBranchName)
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rules shared by branch and ref names. Returns a description of the
/// first violated rule.
fn validate_ref_body(name: &str) -> Result<(), String> {
    if name.ends_with(".lock") {
        return Err("name cannot end with '.lock'".into());
    }
    if name.ends_with('/') {
        return Err("name cannot end with '/'".into());
    }
    if name.contains("..") {
        return Err("name cannot contain '..'".into());
    }
    if name.contains("@{") {
        return Err("name cannot contain '@{'".into());
    }
    if name.contains("//") {
        return Err("name cannot contain '//'".into());
    }
    for c in INVALID_REF_CHARS {
        if name.contains(c) {
            return Err(format!("name cannot contain '{c}'"));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase, so two `Oid`s naming the same object
/// always compare equal byte-for-byte.
///
/// # Example
///
/// ```
/// use stagehand::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a valid hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Get an abbreviated form of the OID.
    ///
    /// Returns the first `len` characters, or the full OID if `len` exceeds it.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git reference name.
///
/// # Example
///
/// ```
/// use stagehand::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("feature/foo").unwrap();
/// let refname = RefName::for_branch(&branch);
/// assert_eq!(refname.as_str(), "refs/heads/feature/foo");
///
/// // Short branch names are qualified, full refs are kept as-is
/// assert_eq!(RefName::qualify_branch("main").unwrap().as_str(), "refs/heads/main");
/// assert_eq!(RefName::qualify_branch("refs/heads/main").unwrap().as_str(), "refs/heads/main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    const HEADS: &'static str = "refs/heads/";
    const TAGS: &'static str = "refs/tags/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create a ref name for a branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::HEADS, branch.as_str()))
    }

    /// Create a ref name for a tag (`refs/tags/<tag>`).
    ///
    /// Tag names follow the same rules as branch names.
    pub fn for_tag(tag: &BranchName) -> Self {
        Self(format!("{}{}", Self::TAGS, tag.as_str()))
    }

    /// Qualify a branch given either as a short name or a full ref.
    ///
    /// Names already starting with `refs/` are validated as-is; anything
    /// else is treated as a branch name under `refs/heads/`.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` or `TypeError::InvalidBranchName`
    /// for names git would reject.
    pub fn qualify_branch(name: &str) -> Result<Self, TypeError> {
        if name.starts_with("refs/") {
            Self::new(name)
        } else {
            Ok(Self::for_branch(&BranchName::new(name)?))
        }
    }

    fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// The short form of the ref: the branch name for `refs/heads/*`,
    /// otherwise the full ref name.
    ///
    /// ```
    /// use stagehand::core::types::RefName;
    ///
    /// assert_eq!(RefName::new("refs/heads/a/b").unwrap().shorthand(), "a/b");
    /// assert_eq!(RefName::new("refs/merges/x").unwrap().shorthand(), "refs/merges/x");
    /// ```
    pub fn shorthand(&self) -> &str {
        self.strip_prefix(Self::HEADS).unwrap_or(&self.0)
    }

    /// Append a component below this ref (`<ref>/<component>`).
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the result is not a valid ref.
    pub fn join(&self, component: &str) -> Result<Self, TypeError> {
        Self::new(format!("{}/{}", self.0, component))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidRefName("ref name cannot be empty".into()));
        }
        if name.starts_with('/') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot start with '/'".into(),
            ));
        }
        validate_ref_body(name).map_err(TypeError::InvalidRefName)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized, repository-relative file path.
///
/// Normalization strips leading and trailing `/`, collapses repeated
/// separators, and drops `.` components. Paths that are empty after
/// normalization, contain a `..` or `.git` component, or contain a NUL
/// byte are rejected.
///
/// # Example
///
/// ```
/// use stagehand::core::types::RepoPath;
///
/// let path = RepoPath::new("./a//b/c.txt/").unwrap();
/// assert_eq!(path.as_str(), "a/b/c.txt");
/// assert_eq!(path.ancestors().collect::<Vec<_>>(), vec!["a", "a/b"]);
///
/// assert!(RepoPath::new("/").is_err());
/// assert!(RepoPath::new("a/../b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a normalized repository path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` for paths that cannot name a file
    /// inside the repository.
    pub fn new(path: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = path.as_ref();
        if raw.contains('\0') {
            return Err(TypeError::InvalidPath(
                "path cannot contain NUL bytes".into(),
            ));
        }

        let mut components = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(TypeError::InvalidPath(
                        "path cannot contain '..' components".into(),
                    ))
                }
                c if c.eq_ignore_ascii_case(".git") => {
                    return Err(TypeError::InvalidPath(
                        "path cannot contain a '.git' component".into(),
                    ))
                }
                c => components.push(c),
            }
        }

        if components.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }

        Ok(Self(components.join("/")))
    }

    /// Append a single component to this path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if `component` is not a single
    /// valid path component.
    pub fn join(&self, component: &str) -> Result<Self, TypeError> {
        if component.contains('/') {
            return Err(TypeError::InvalidPath(format!(
                "'{component}' is not a single path component"
            )));
        }
        Self::new(format!("{}/{}", self.0, component))
    }

    /// Proper ancestor directories of this path, outermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .match_indices('/')
            .map(move |(idx, _)| &self.0[..idx])
    }

    /// Whether `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &RepoPath) -> bool {
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An author or committer identity.
///
/// `time` is optional in requests; the engine fills it with the current
/// time during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// When the change was made, with the author's UTC offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<FixedOffset>>,
}

impl Signature {
    /// Create a signature without a timestamp.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time: None,
        }
    }

    /// Set an explicit timestamp.
    pub fn at(mut self, time: DateTime<FixedOffset>) -> Self {
        self.time = Some(time);
        self
    }

    /// Copy of this signature with `now` filled in when no time was given.
    pub fn or_time(&self, now: DateTime<FixedOffset>) -> Self {
        Self {
            time: Some(self.time.unwrap_or(now)),
            ..self.clone()
        }
    }
}

/// Why a path cannot be staged against the current tree state.
///
/// All variants except [`PathViolation::Malformed`] and
/// [`PathViolation::FileNotFound`] are file/directory type collisions; see
/// [`PathViolation::is_blob_name_collision`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathViolation {
    /// The path itself is not a valid repository path.
    #[error("invalid path: {0}")]
    Malformed(String),

    /// A file already exists at the path.
    #[error("a file with this name already exists")]
    FileExists,

    /// No file exists at the path.
    #[error("file doesn't exist")]
    FileNotFound,

    /// The path names a directory, not a file.
    #[error("path is a directory")]
    IsDirectory,

    /// The path, or one of its parent directories, is already a file.
    #[error("directory '{directory}' already exists as a file")]
    DirectoryExistsAsFile {
        /// The component that is a file
        directory: String,
    },

    /// A non-empty directory already exists at the path.
    #[error("directory already exists")]
    DirectoryExists,
}

impl PathViolation {
    /// Whether this violation is a file/directory type collision rather
    /// than a missing or malformed path.
    pub fn is_blob_name_collision(&self) -> bool {
        matches!(
            self,
            PathViolation::FileExists
                | PathViolation::IsDirectory
                | PathViolation::DirectoryExistsAsFile { .. }
                | PathViolation::DirectoryExists
        )
    }
}
