//! imgq-server - image question/answer annotation service
//!
//! Loads the image catalog on first boot, then serves the annotation API
//! until Ctrl+C / SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use imgq_common::db::init_database;
use imgq_common::Mode;
use imgq_server::config::{Args, ServerConfig};
use imgq_server::services::{AnnotationStore, ImageCatalog};
use imgq_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "imgq_server={level},imgq_common={level},tower_http={level}",
            level = config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting imgq-server v{} in {} mode",
        env!("CARGO_PKG_VERSION"),
        config.mode
    );
    info!("Database path: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    match ImageCatalog::new(pool.clone())
        .load_from_path(&config.seed_path)
        .await
    {
        Ok(0) => {}
        Ok(count) => info!("Seeded {} images from {}", count, config.seed_path.display()),
        Err(e) => warn!("Image catalog not seeded: {}", e),
    }

    if config.mode == Mode::SinglePool {
        AnnotationStore::new(pool.clone(), config.mode)
            .compact_single_pool()
            .await
            .context("Failed to compact annotations")?;
    }

    let state = AppState::new(
        pool,
        config.mode,
        config.media_root.clone(),
        config.recent_feed_limit,
    );
    let app = build_router(state);

    info!("Starting HTTP server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
