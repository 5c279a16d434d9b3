//! Authentication middleware
//!
//! Every `/api` request carries HTTP Basic credentials. The verified
//! `Identity` is stored in the request extensions for handlers to extract
//! with `Extension<Identity>`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Username and password from an `Authorization: Basic` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Parse the `Authorization` header
pub fn parse_basic_auth(headers: &HeaderMap) -> ApiResult<BasicCredentials> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Credentials required".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Malformed Authorization header".to_string()))?;

    let encoded = value
        .strip_prefix("Basic ")
        .ok_or_else(|| ApiError::Unauthorized("Only Basic authentication is supported".to_string()))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| ApiError::Unauthorized("Malformed Basic credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| ApiError::Unauthorized("Malformed Basic credentials".to_string()))?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| ApiError::Unauthorized("Malformed Basic credentials".to_string()))?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Authentication middleware
///
/// Returns 401 with a `WWW-Authenticate` challenge when credentials are
/// missing or wrong. Applied to protected routes only.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let credentials = parse_basic_auth(request.headers())?;
    let identity = state
        .gate()
        .authenticate(&credentials.username, &credentials.password)
        .await?;

    debug!("Authenticated {} ({})", identity.username, identity.role);
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
