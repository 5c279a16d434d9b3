//! Progress, feed and leaderboard endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use imgq_common::{Identity, Mode};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::services::{FeedItem, GlobalProgress, LeaderboardEntry, UserProgress};
use crate::AppState;

/// Response of GET /api/stats
#[derive(Debug, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum StatsResponse {
    Global(GlobalProgress),
    User(UserProgress),
}

/// GET /api/stats
///
/// Multi-user annotators see their own queue; everyone else sees the
/// catalog-wide view.
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> ApiResult<Json<StatsResponse>> {
    let aggregator = state.aggregator();
    let stats = if state.mode == Mode::MultiUser && !caller.is_admin() {
        StatsResponse::User(aggregator.user_progress(&caller.user_id).await?)
    } else {
        StatsResponse::Global(aggregator.global_progress().await?)
    };
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// GET /api/recent?limit=N
///
/// Newest live annotations first. Multi-user annotators only see their own.
pub async fn get_recent_feed(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    let limit = query.limit.unwrap_or(state.recent_feed_limit);
    let author = match state.mode {
        Mode::MultiUser if !caller.is_admin() => Some(caller.user_id.as_str()),
        _ => None,
    };

    let feed = state.aggregator().recent_feed(author, limit).await?;
    Ok(Json(feed))
}

/// GET /api/leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.aggregator().leaderboard().await?))
}
