//! imgq-server library - image question/answer annotation service
//!
//! Serves one unit of work at a time to authenticated annotators, records
//! their annotate/reject/report actions, and reports progress. Runs in one of
//! two deployment modes (`single_pool` or `multi_user`) selected at startup.

use axum::Router;
use imgq_common::Mode;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

use services::{AccessGate, Aggregator, AnnotationStore, AssignmentLedger, ImageCatalog};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Deployment variant, fixed for the process lifetime
    pub mode: Mode,
    /// Folder served under /media
    pub media_root: PathBuf,
    /// Default size of the recent feed
    pub recent_feed_limit: i64,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, mode: Mode, media_root: PathBuf, recent_feed_limit: i64) -> Self {
        Self {
            db,
            mode,
            media_root,
            recent_feed_limit,
        }
    }

    pub fn catalog(&self) -> ImageCatalog {
        ImageCatalog::new(self.db.clone())
    }

    pub fn ledger(&self) -> AssignmentLedger {
        AssignmentLedger::new(self.db.clone(), self.mode)
    }

    pub fn store(&self) -> AnnotationStore {
        AnnotationStore::new(self.db.clone(), self.mode)
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.db.clone())
    }

    pub fn gate(&self) -> AccessGate {
        AccessGate::new(self.db.clone())
    }
}

/// Build application router
///
/// `/health` and `/media` are public; everything under `/api` requires
/// HTTP Basic credentials.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/work", get(api::get_work_item))
        .route("/api/images/:image_id", get(api::get_image))
        .route("/api/annotate", post(api::submit_annotation))
        .route("/api/report", post(api::report_image))
        .route("/api/stats", get(api::get_stats))
        .route("/api/recent", get(api::get_recent_feed))
        .route("/api/leaderboard", get(api::get_leaderboard))
        .route("/api/admin/users", post(api::create_user))
        .route("/api/admin/users/stats", get(api::get_user_breakdown))
        .route("/api/admin/assign", post(api::bulk_assign))
        .route("/api/admin/export", get(api::export_filtered))
        .route("/api/admin/export/all", get(api::export_catalog))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::health_routes())
        .nest_service("/media", ServeDir::new(&state.media_root));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
