//! Bootstrap configuration file
//!
//! Settings sources priority (resolved by the service crate):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file (this module)
//! 4. Built-in defaults
//!
//! Every field here is optional so that a missing key falls through to the
//! built-in default instead of overriding it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Listen address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Listen port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Discovery (routing) service endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_url: Option<String>,

    #[serde(default)]
    pub federation: FederationSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Fan-out tuning
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FederationSettings {
    /// Concurrent legs per session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Per-leg timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leg_timeout_ms: Option<u64>,

    /// Additional attempts after a failed leg (0 or 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leg_retries: Option<u32>,

    /// Delay before a retry in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,

    /// Longest time window requested from a single backend leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_window_days: Option<i64>,

    /// Keep unrelated epochs of one network in separate legs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_by_year: Option<bool>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Operational log file (JSON lines); tracing only if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the explicitly named file, or the platform default if it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file yields an empty configuration.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!("Config file not found: {}", path.display())));
            }
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Write this configuration as TOML, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Platform default: `<config dir>/eidafed/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("eidafed").join("config.toml"))
}
