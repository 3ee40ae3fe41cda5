//! Store configuration
//!
//! Loaded from a JSON file; every field except `data_dir` has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "RTS_CONFIG_READ",
            ConfigError::Parse(_) => "RTS_CONFIG_PARSE",
            ConfigError::Invalid(_) => "RTS_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for the update log and the index checkpoint
    pub data_dir: PathBuf,

    /// fsync after every log append (default true)
    #[serde(default = "default_sync_on_append")]
    pub sync_on_append: bool,

    /// Commits allowed to fold at the same time (default 2)
    #[serde(default = "default_max_concurrent_commits")]
    pub max_concurrent_commits: usize,

    /// Delete-by-query predicates retained for reordered leader adds (default 100)
    #[serde(default = "default_dbq_retention")]
    pub dbq_retention: usize,
}

fn default_sync_on_append() -> bool {
    true
}

fn default_max_concurrent_commits() -> usize {
    2
}

fn default_dbq_retention() -> usize {
    100
}

impl StoreConfig {
    /// Defaults for everything but the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_on_append: default_sync_on_append(),
            max_concurrent_commits: default_max_concurrent_commits(),
            dbq_retention: default_dbq_retention(),
        }
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.max_concurrent_commits == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_commits must be > 0".into(),
            ));
        }
        if self.dbq_retention == 0 {
            return Err(ConfigError::Invalid("dbq_retention must be > 0".into()));
        }
        Ok(())
    }

    pub fn with_sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    pub fn with_max_concurrent_commits(mut self, max: usize) -> Self {
        self.max_concurrent_commits = max;
        self
    }

    pub fn with_dbq_retention(mut self, retention: usize) -> Self {
        self.dbq_retention = retention;
        self
    }
}
