//! Server configuration
//!
//! Command-line flags and `IMGQ_*` environment variables (via clap) take
//! precedence over the TOML file, which takes precedence over compiled
//! defaults.

use clap::Parser;
use imgq_common::config::{CompiledDefaults, TomlConfig};
use imgq_common::{Mode, Result};
use std::path::PathBuf;

/// Command-line arguments for imgq-server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "imgq-server")]
#[command(about = "Image question/answer annotation service", long_about = None)]
#[command(version)]
pub struct Args {
    /// TOML config file
    #[arg(short, long, env = "IMGQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment variant: single_pool or multi_user
    #[arg(short, long, env = "IMGQ_MODE")]
    pub mode: Option<Mode>,

    /// HTTP listen address
    #[arg(short, long, env = "IMGQ_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "IMGQ_DATABASE")]
    pub database: Option<PathBuf>,

    /// Seed document loaded into an empty catalog
    #[arg(short, long, env = "IMGQ_SEED")]
    pub seed: Option<PathBuf>,

    /// Folder served under /media
    #[arg(long, env = "IMGQ_MEDIA_ROOT")]
    pub media_root: Option<PathBuf>,

    /// Default number of entries in the recent feed
    #[arg(long, env = "IMGQ_RECENT_LIMIT")]
    pub recent_feed_limit: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "IMGQ_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: Mode,
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub seed_path: PathBuf,
    pub media_root: PathBuf,
    pub recent_feed_limit: i64,
    pub log_level: String,
}

impl ServerConfig {
    /// Merge the three layers
    pub fn resolve(args: &Args, file: TomlConfig, defaults: CompiledDefaults) -> Self {
        Self {
            mode: args.mode.or(file.mode).unwrap_or(defaults.mode),
            bind_addr: args
                .bind_addr
                .clone()
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            database_path: args
                .database
                .clone()
                .or(file.database_path)
                .unwrap_or(defaults.database_path),
            seed_path: args
                .seed
                .clone()
                .or(file.seed_path)
                .unwrap_or(defaults.seed_path),
            media_root: args
                .media_root
                .clone()
                .or(file.media_root)
                .unwrap_or(defaults.media_root),
            recent_feed_limit: args
                .recent_feed_limit
                .or(file.recent_feed_limit)
                .unwrap_or(defaults.recent_feed_limit),
            log_level: args
                .log_level
                .clone()
                .unwrap_or(file.logging.level),
        }
    }

    /// Locate and read the TOML file, then merge
    pub fn load(args: &Args) -> Result<Self> {
        let file = TomlConfig::load_or_default(args.config.as_deref())?;
        Ok(Self::resolve(
            args,
            file,
            CompiledDefaults::for_current_platform(),
        ))
    }
}
