//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Priorities 1 and 2 are handled by the binary's argument parser; this
//! module supplies the TOML layer and the compiled defaults.

use crate::{Error, Mode, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "IMGQ_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; anything missing falls through to the
/// compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Deployment variant (`single_pool` or `multi_user`)
    #[serde(default)]
    pub mode: Option<Mode>,

    /// HTTP listen address, e.g. `127.0.0.1:5800`
    #[serde(default)]
    pub bind_addr: Option<String>,

    /// Path to the SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Seed document loaded into the image catalog at first boot
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Folder serving non-URL images
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    /// Default size of the recent-annotations feed
    #[serde(default)]
    pub recent_feed_limit: Option<i64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the config file if one can be located, else empty config
    ///
    /// An explicitly named file that cannot be read is an error; a missing
    /// default file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            info!("Loaded config file: {}", path.display());
            return Ok(config);
        }

        match default_config_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    info!("Loaded config file: {}", path.display());
                    Ok(config)
                }
                Err(e) => {
                    warn!("Ignoring unreadable config file {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            _ => Ok(Self::default()),
        }
    }
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub mode: Mode,
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub seed_path: PathBuf,
    pub media_root: PathBuf,
    pub recent_feed_limit: i64,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = default_data_dir();
        Self {
            mode: Mode::SinglePool,
            bind_addr: "127.0.0.1:5800".to_string(),
            database_path: data_dir.join("imgq.db"),
            seed_path: PathBuf::from("images.json"),
            media_root: PathBuf::from("."),
            recent_feed_limit: 50,
            log_level: default_log_level(),
        }
    }
}

/// `<config_dir>/imgq/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("imgq").join("config.toml"))
}

/// OS-dependent data folder
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("imgq"))
        .unwrap_or_else(|| PathBuf::from("./imgq_data"))
}
