//! imgq-create-user - provision an account from the command line
//!
//! Typically used once to create the first administrator.

use anyhow::{bail, Context, Result};
use clap::Parser;
use imgq_common::config::{CompiledDefaults, TomlConfig};
use imgq_common::db::init_database;
use imgq_common::{Error, Role};
use imgq_server::services::AccessGate;
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments for imgq-create-user
#[derive(Parser, Debug)]
#[command(name = "imgq-create-user")]
#[command(about = "Create an imgq account", long_about = None)]
#[command(version)]
struct Args {
    /// Login name
    username: String,

    /// Password
    password: String,

    /// admin or annotator
    #[arg(long, default_value = "admin")]
    role: String,

    /// TOML config file
    #[arg(short, long, env = "IMGQ_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "IMGQ_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let role: Role = args.role.parse().context("Invalid role")?;

    let file = TomlConfig::load_or_default(args.config.as_deref())?;
    let database_path = args
        .database
        .or(file.database_path)
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().database_path);

    let pool = init_database(&database_path)
        .await
        .with_context(|| format!("Failed to open {}", database_path.display()))?;

    match AccessGate::new(pool).create_user(&args.username, &args.password, role).await {
        Ok(user) => {
            info!("User '{}' created ({}, id {})", user.username, user.role, user.id);
            Ok(())
        }
        Err(Error::Conflict(_)) => bail!("User '{}' already exists", args.username),
        Err(e) => Err(e.into()),
    }
}
