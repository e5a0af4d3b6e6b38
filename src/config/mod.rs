//! Site configuration
//!
//! A site is described by a small TOML file:
//!
//! ```toml
//! site_id = 1
//! local_partitions = [0, 1, 2, 3]
//! pool_size = 16
//!
//! [shuffle]
//! enabled = true
//! simulated_work_ms = 5
//! ```
//!
//! Every field except `local_partitions` has a default. Validation collects
//! all problems before reporting them.

use crate::coordination::PartitionId;
use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading a site configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("[E{code:04}] Failed to read configuration {}", .path.display(), code = ErrorCode::CONFIG_NOT_FOUND)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Failed to parse configuration: {source}", code = ErrorCode::CONFIG_PARSE_ERROR)]
    Parse {
        #[source]
        source: toml::de::Error,
    },

    #[error("[E{code:04}] Invalid configuration: {}", .errors.join("; "), code = ErrorCode::CONFIG_VALIDATION_FAILED)]
    Validation { errors: Vec<String> },
}

impl ConfigError {
    pub fn code(&self) -> u16 {
        match self {
            ConfigError::Io { .. } => ErrorCode::CONFIG_NOT_FOUND,
            ConfigError::Parse { .. } => ErrorCode::CONFIG_PARSE_ERROR,
            ConfigError::Validation { .. } => ErrorCode::CONFIG_VALIDATION_FAILED,
        }
    }
}

/// Node-level settings for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub site_id: u32,

    /// Partitions hosted on this site
    pub local_partitions: Vec<PartitionId>,

    /// Maximum number of finished coordinators kept for reuse
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default)]
    pub shuffle: ShuffleSettings,
}

/// Shuffle worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleSettings {
    /// Whether a shuffle worker is registered with the site
    #[serde(default = "default_shuffle_enabled")]
    pub enabled: bool,

    /// Delay applied by the pass-through handler in each stage
    #[serde(default)]
    pub simulated_work_ms: u64,
}

fn default_pool_size() -> usize {
    16
}

fn default_shuffle_enabled() -> bool {
    true
}

impl Default for ShuffleSettings {
    fn default() -> Self {
        Self {
            enabled: default_shuffle_enabled(),
            simulated_work_ms: 0,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_id: 0,
            local_partitions: vec![0],
            pool_size: default_pool_size(),
            shuffle: ShuffleSettings::default(),
        }
    }
}

impl SiteConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading site configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.local_partitions.is_empty() {
            errors.push("local_partitions must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for &partition in &self.local_partitions {
            if partition < 0 {
                errors.push(format!("partition id {} is negative", partition));
            }
            if !seen.insert(partition) {
                errors.push(format!("partition id {} is listed more than once", partition));
            }
        }

        if self.pool_size == 0 {
            errors.push("pool_size must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { errors })
        }
    }
}
