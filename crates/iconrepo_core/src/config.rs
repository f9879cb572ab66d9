//! Startup configuration.
//!
//! # Responsibility
//! - Load store locations and logging settings from TOML.
//! - Apply environment overrides on top of the file values.
//! - Reject missing required values before any store is touched.

use crate::logging::default_log_level;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONTENT_STORE_ENV: &str = "ICONREPO_CONTENT_STORE";
pub const DATABASE_ENV: &str = "ICONREPO_DATABASE";
pub const LOG_LEVEL_ENV: &str = "ICONREPO_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "ICONREPO_LOG_DIR";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),
}

/// Store locations plus logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Root of the git working tree holding iconfiles.
    pub content_store_location: PathBuf,
    /// SQLite database file holding icon metadata.
    pub database_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            content_store_location: PathBuf::new(),
            database_path: PathBuf::new(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl RepoConfig {
    /// Config pointing both stores below `root`; used by tools and tests.
    pub fn under(root: &Path) -> Self {
        Self {
            content_store_location: root.join("content"),
            database_path: root.join("metadata.sqlite3"),
            ..Self::default()
        }
    }

    /// Reads `path` (when given), then applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!("event=config_load module=config path={}", path.display());
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overrides fields from `lookup`; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(location) = lookup(CONTENT_STORE_ENV) {
            self.content_store_location = PathBuf::from(location);
        }
        if let Some(database) = lookup(DATABASE_ENV) {
            self.database_path = PathBuf::from(database);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log_level = level;
        }
        if let Some(dir) = lookup(LOG_DIR_ENV) {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Checks that every required value is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_store_location.as_os_str().is_empty() {
            return Err(ConfigError::Missing("content_store_location"));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("database_path"));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Missing("log_level"));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
