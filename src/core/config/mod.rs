//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$STAGEHAND_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/stagehand/config.toml`
//! 3. `~/.stagehand/config.toml`
//!
//! # Repo Config Location
//!
//! `<common_dir>/stagehand/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use stagehand::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("ephemeral refs under {}", config.merge_ref_prefix());
//! ```

pub mod schema;

pub use schema::{ConfigFile, MergeConfig, StagingConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::StagehandPaths;

/// Default namespace for ephemeral merge refs.
pub const DEFAULT_MERGE_REF_PREFIX: &str = "refs/merges/user";
/// Default ancestor label in conflict markers.
pub const DEFAULT_ANCESTOR_LABEL: &str = "parent";
/// Default `Mkdir` placeholder file name.
pub const DEFAULT_PLACEHOLDER: &str = ".gitkeep";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: ConfigFile,
    /// Repository configuration (if one was found)
    pub repo: Option<ConfigFile>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Configuration from already-parsed files.
    pub fn new(global: ConfigFile, repo: Option<ConfigFile>) -> Self {
        Self {
            global,
            repo,
            global_path: None,
            repo_path: None,
        }
    }

    /// Load configuration from default locations.
    ///
    /// If `paths` is provided, also loads the repository config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or hold
    /// invalid values. Missing files are not an error.
    pub fn load(paths: Option<&StagehandPaths>) -> Result<Self, ConfigError> {
        let global = Self::find_global();
        let repo = paths.map(StagehandPaths::repo_config_path);
        Self::load_files(global.as_deref(), repo.as_deref())
    }

    /// Load configuration from explicit file locations.
    ///
    /// Paths that do not exist are skipped.
    pub fn load_files(global: Option<&Path>, repo: Option<&Path>) -> Result<Self, ConfigError> {
        let (global, global_path) = match global.filter(|p| p.exists()) {
            Some(path) => (Self::read_config(path)?, Some(path.to_path_buf())),
            None => (ConfigFile::default(), None),
        };
        let (repo, repo_path) = match repo.filter(|p| p.exists()) {
            Some(path) => (Some(Self::read_config(path)?), Some(path.to_path_buf())),
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        tracing::debug!(
            global = ?global_path,
            repo = ?repo_path,
            "loaded configuration"
        );

        Ok(Config {
            global,
            repo,
            global_path,
            repo_path,
        })
    }

    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("STAGEHAND_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("stagehand/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".stagehand/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_config(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the repository config atomically (temp file, then rename).
    pub fn write_repo(paths: &StagehandPaths, config: &ConfigFile) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = paths.repo_config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        fs::rename(&temp_path, &path).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        Ok(path)
    }

    /// Pick a value from the repo file, falling back to the global file.
    fn pick<'a, T: ?Sized>(&'a self, get: impl Fn(&'a ConfigFile) -> Option<&'a T>) -> Option<&'a T> {
        self.repo.as_ref().and_then(&get).or_else(|| get(&self.global))
    }

    /// Configured default branch, if any.
    pub fn default_branch(&self) -> Option<&str> {
        self.pick(|c| c.default_branch.as_deref())
    }

    /// Namespace for ephemeral merge refs.
    pub fn merge_ref_prefix(&self) -> &str {
        self.pick(|c| c.merge.as_ref().and_then(|m| m.ref_prefix.as_deref()))
            .unwrap_or(DEFAULT_MERGE_REF_PREFIX)
    }

    /// Ancestor label used in conflict markers.
    pub fn ancestor_label(&self) -> &str {
        self.pick(|c| c.merge.as_ref().and_then(|m| m.ancestor_label.as_deref()))
            .unwrap_or(DEFAULT_ANCESTOR_LABEL)
    }

    /// File name of the `Mkdir` placeholder blob.
    pub fn placeholder(&self) -> &str {
        self.pick(|c| c.staging.as_ref().and_then(|s| s.placeholder.as_deref()))
            .unwrap_or(DEFAULT_PLACEHOLDER)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}
