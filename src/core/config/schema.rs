//! core::config::schema
//!
//! Configuration schema types.
//!
//! The global file and the repository file share one schema; values in the
//! repository file override the global ones key by key.
//!
//! # Example
//!
//! ```toml
//! default_branch = "main"
//!
//! [merge]
//! ref_prefix = "refs/merges/user"
//! ancestor_label = "parent"
//!
//! [staging]
//! placeholder = ".gitkeep"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{BranchName, RefName, RepoPath};

/// One configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Branch used when a commit request names none
    pub default_branch: Option<String>,

    /// Merge-attempt settings
    pub merge: Option<MergeConfig>,

    /// Staging settings
    pub staging: Option<StagingConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(branch) = &self.default_branch {
            BranchName::new(branch).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid default_branch: {}", e))
            })?;
        }
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        if let Some(staging) = &self.staging {
            staging.validate()?;
        }
        Ok(())
    }
}

/// Settings for the merge attempt taken when a branch has moved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Namespace for ephemeral refs created during merge attempts
    pub ref_prefix: Option<String>,

    /// Label of the ancestor side in conflict markers
    pub ancestor_label: Option<String>,
}

impl MergeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.ref_prefix {
            if !prefix.starts_with("refs/") {
                return Err(ConfigError::InvalidValue(format!(
                    "merge.ref_prefix '{}' must start with 'refs/'",
                    prefix
                )));
            }
            RefName::new(prefix.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid merge.ref_prefix: {}", e))
            })?;
        }
        if let Some(label) = &self.ancestor_label {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "merge.ancestor_label cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Settings for tree staging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    /// File name of the placeholder blob written by `Mkdir`
    pub placeholder: Option<String>,
}

impl StagingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.placeholder {
            let path = RepoPath::new(name).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid staging.placeholder: {}", e))
            })?;
            if path.as_str() != name || name.contains('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "staging.placeholder '{}' must be a single file name",
                    name
                )));
            }
        }
        Ok(())
    }
}
