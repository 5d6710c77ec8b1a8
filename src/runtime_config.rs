//! # Runtime Configuration
//!
//! Settings that affect request handling and logging, loaded at startup from
//! environment variables, a YAML file, or both.
//!
//! ## Environment Variables
//!
//! - `BRRTBIND_MAX_BODY_BYTES`: largest request body body preparation accepts.
//!   Decimal (`1048576`) or hexadecimal (`0x100000`). Default 10 MiB.
//! - `BRRTBIND_LOG_*`: see [`LogConfig::from_env`].
//!
//! ## YAML
//!
//! ```yaml
//! max_body_bytes: 1048576
//! log:
//!   log_level: debug
//!   format: pretty
//! ```
//!
//! Environment variables override values read from YAML.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// Default body size limit: 10 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Largest request body accepted by body preparation, in bytes
    pub max_body_bytes: usize,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse YAML, then apply environment overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RuntimeConfig =
            serde_yaml::from_str(yaml).context("Failed to parse runtime config")?;
        Ok(config.with_env_overrides())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime config {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = env::var("BRRTBIND_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| parse_size(&v))
        {
            self.max_body_bytes = limit;
        }
        self.log = self.log.with_env_overrides();
        self
    }
}

fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
