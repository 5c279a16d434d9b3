//! Administrator endpoints
//!
//! Every handler here checks the caller's role first.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use imgq_common::{Identity, Mode, Role, User};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::{StatusFilter, UserBreakdown};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Annotator
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    caller.require_admin()?;
    let user = state
        .gate()
        .create_user(&request.username, &request.password, request.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/admin/users/stats
pub async fn get_user_breakdown(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> ApiResult<Json<Vec<UserBreakdown>>> {
    caller.require_admin()?;
    Ok(Json(state.aggregator().per_user_breakdown().await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub user_id: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub user_id: String,
    pub requested: i64,
    pub assigned: usize,
}

/// POST /api/admin/assign
///
/// Multi-user mode only.
pub async fn bulk_assign(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<AssignResponse>> {
    caller.require_admin()?;
    if state.mode != Mode::MultiUser {
        return Err(ApiError::BadRequest(
            "Bulk assignment is only available in multi-user mode".to_string(),
        ));
    }

    let assigned = state
        .ledger()
        .bulk_assign(&request.user_id, request.count)
        .await?;
    Ok(Json(AssignResponse {
        user_id: request.user_id,
        requested: request.count,
        assigned,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// approved | rejected | reported | all
    pub status: Option<String>,
    pub user_id: Option<String>,
}

/// Serialize rows as a downloadable JSON attachment
fn attachment<T: Serialize>(filename: &str, rows: &T) -> ApiResult<impl IntoResponse> {
    let body = serde_json::to_vec_pretty(rows)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize export: {}", e)))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}

/// GET /api/admin/export?status=&user_id=
pub async fn export_filtered(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;

    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(other) => Some(other.parse::<StatusFilter>()?),
    };
    let rows = state
        .aggregator()
        .export_filtered(status, query.user_id.as_deref())
        .await?;

    let filename = format!(
        "annotations_{}.json",
        status.map(|s| s.as_str()).unwrap_or("all")
    );
    attachment(&filename, &rows)
}

/// GET /api/admin/export/all
///
/// Every catalog image, annotated or not.
pub async fn export_catalog(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;
    let rows = state.aggregator().export_catalog().await?;
    attachment("all_images.json", &rows)
}
