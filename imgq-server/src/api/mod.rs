//! HTTP API handlers for imgq-server

pub mod admin;
pub mod auth;
pub mod health;
pub mod stats;
pub mod work;

pub use admin::{bulk_assign, create_user, export_catalog, export_filtered, get_user_breakdown};
pub use auth::auth_middleware;
pub use health::health_routes;
pub use stats::{get_leaderboard, get_recent_feed, get_stats};
pub use work::{get_image, get_work_item, report_image, submit_annotation};
