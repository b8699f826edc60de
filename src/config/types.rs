//! Top-level configuration.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::validation::{self, ValidationError};
use super::{BufferConfig, CacheConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Store configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// In-memory buffer limits.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Persistent message cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check the loaded values, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validation::validate(self)
    }
}

pub(super) fn default_true() -> bool {
    true
}
