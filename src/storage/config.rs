//! Configuration handling for taskgraph
//!
//! Reconciler settings are layered, later layers winning:
//! built-in defaults, the user config file
//! (`~/.config/taskgraph/config.toml` or `--config`), the `[reconciler]`
//! table of a machine file, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ReconcilerConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// A partial set of reconciler settings; unset fields fall through to the
/// layer below
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerSettings {
    pub max_replans: Option<u32>,
    pub workers: Option<usize>,
}

impl ReconcilerSettings {
    /// Overlays `other` on top of `self`
    pub fn merge(self, other: ReconcilerSettings) -> Self {
        Self {
            max_replans: other.max_replans.or(self.max_replans),
            workers: other.workers.or(self.workers),
        }
    }

    /// Applies the settings to the defaults and validates the result
    pub fn resolve(self) -> Result<ReconcilerConfig, ConfigError> {
        let defaults = ReconcilerConfig::default();
        let config = ReconcilerConfig {
            max_replans: self.max_replans.unwrap_or(defaults.max_replans),
            workers: self.workers.unwrap_or(defaults.workers),
        };

        if config.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        Ok(config)
    }
}

/// Contents of the user config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub reconciler: ReconcilerSettings,
}

impl UserConfig {
    /// Parses a config document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Locates and loads the user config file
pub struct Config;

impl Config {
    /// Returns the user config directory
    pub fn user_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "taskgraph", "taskgraph").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads the user config
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<UserConfig> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        match Self::user_config_dir().map(|dir| dir.join("config.toml")) {
            Some(path) if path.exists() => Self::load_file(&path),
            _ => Ok(UserConfig::default()),
        }
    }

    /// Loads a config file from a specific path
    pub fn load_file(path: &Path) -> Result<UserConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        UserConfig::from_toml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}
