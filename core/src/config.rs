use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Name of the per-user Coda directory under the home directory.
pub const CODA_DIR_NAME: &str = ".coda";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration for the Coda CLI and host, read from `~/.coda/config.toml`.
///
/// Every field is optional in the file; missing sections fall back to
/// their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CodaConfig {
    /// Default tracing filter (e.g. "info", "coda_host=debug")
    pub log_level: Option<String>,
    pub inbox: InboxConfig,
    pub registry: RegistryConfig,
}

/// Settings for the inbox poll loop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct InboxConfig {
    pub poll_interval_ms: u64,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl InboxConfig {
    pub fn poll_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Settings for the host-side session registry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// How often expired sessions are swept
    pub sweep_interval_secs: u64,
    /// How long an expired session stays visible before it is dropped
    pub expired_retention_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5,
            expired_retention_secs: 30,
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn expired_retention(&self) -> Duration {
        Duration::from_secs(self.expired_retention_secs)
    }
}

impl CodaConfig {
    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads configuration from `~/.coda/config.toml`
    pub fn load_from_default() -> ConfigResult<Self> {
        Self::load_from_file(&get_default_config_file()?)
    }

    /// Saves configuration to a file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string(self)?;

        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }
}

/// Helper function to get the per-user Coda directory (`~/.coda`)
pub fn get_coda_dir() -> ConfigResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home_dir.join(CODA_DIR_NAME))
}

/// Helper function to get default config file path
pub fn get_default_config_file() -> ConfigResult<PathBuf> {
    Ok(get_coda_dir()?.join(CONFIG_FILE_NAME))
}
