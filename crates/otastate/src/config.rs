//! Configuration loading and types

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use otastate_inventory::{InventoryConfig, InventoryEntry};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the otastate agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent process settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Durable storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Inventory settings and initial attributes
    #[serde(default)]
    pub inventory: InventorySection,
}

/// Agent process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Durable storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory backing the durable medium
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/otastate")
}

/// `[inventory]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySection {
    /// Cache and publisher settings
    #[serde(flatten)]
    pub settings: InventoryConfig,
    /// Attributes loaded into the cache at startup
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<InventoryEntry>,
}

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "OTASTATE_CONFIG";

const CONFIG_FILE: &str = "otastate.toml";

impl Config {
    /// Parse one TOML file
    ///
    /// # Errors
    /// Returns an error naming the file if it cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Load the file named by `OTASTATE_CONFIG`, else the first existing
    /// candidate from [`Config::search_paths`], else built-in defaults
    ///
    /// # Errors
    /// Returns an error if the selected file cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => {
                tracing::warn!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Candidate config files, most specific first
    #[must_use]
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(CONFIG_FILE),
            Path::new("/etc/otastate").join(CONFIG_FILE),
        ];
        paths.extend(dirs::config_dir().map(|dir| dir.join("otastate").join(CONFIG_FILE)));
        paths
    }
}
