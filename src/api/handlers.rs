//! API request handlers
//!
//! Thin axum wrappers around the [`Coordinator`]: extract identity, hand
//! off, serialize. Error-to-status mapping lives on `RelayError`.

use crate::coordinator::models::{CheckStatusRequest, PostStatusOutcome, PostStatusRequest};
use crate::error::RelayError;
use crate::identity::identity_from_headers;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Coordination hot path
// ============================================================================

pub async fn check_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CheckStatusRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let identity = identity_from_headers(&headers);
    let resp = state.coordinator.check_status(&identity, &req).await?;
    Ok(Json(resp).into_response())
}

pub async fn post_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PostStatusRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let identity = identity_from_headers(&headers);

    match state.coordinator.post_status(&identity, &req).await? {
        PostStatusOutcome::Ok(resp) => Ok(Json(resp).into_response()),
        PostStatusOutcome::ReleaseFailed(resp) => {
            Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(resp)).into_response())
        }
    }
}

// ============================================================================
// Graph and activity
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub regenerate: Option<String>,
}

pub async fn graph(
    State(state): State<AppState>,
    Query(query): Query<GraphQuery>,
) -> Result<Response, RelayError> {
    let repo_url = required_param(query.repo_url, "repo_url")?;
    let branch = required_param(query.branch, "branch")?;
    let regenerate = matches!(query.regenerate.as_deref(), Some("true") | Some("1"));

    let view = state.coordinator.graph(&repo_url, &branch, regenerate).await?;
    Ok(Json(view).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub limit: Option<usize>,
}

pub async fn activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Response, RelayError> {
    let repo_url = required_param(query.repo_url, "repo_url")?;
    let branch = required_param(query.branch, "branch")?;

    let resp = state
        .coordinator
        .activity(&repo_url, &branch, query.limit)
        .await?;
    Ok((
        [(header::CACHE_CONTROL, "no-store, max-age=0")],
        Json(resp),
    )
        .into_response())
}

// ============================================================================
// Administration
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ScopeRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
}

pub async fn release_all_locks(
    State(state): State<AppState>,
    body: Result<Json<ScopeRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let repo_url = required_param(req.repo_url, "repo_url")?;
    let branch = required_param(req.branch, "branch")?;

    let resp = state.coordinator.release_all(&repo_url, &branch).await?;
    Ok(Json(resp).into_response())
}

pub async fn clear_agent_and_feed(
    State(state): State<AppState>,
    body: Result<Json<ScopeRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let repo_url = required_param(req.repo_url, "repo_url")?;
    let branch = required_param(req.branch, "branch")?;

    let resp = state.coordinator.clear(&repo_url, &branch).await?;
    Ok(Json(resp).into_response())
}

/// Cron-driven sweep of expired locks across all namespaces. Requires the
/// shared bearer secret.
pub async fn cleanup_stale_locks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", state.config.cron_secret))
        .unwrap_or(false);

    if !authorized {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response());
    }

    let resp = state.coordinator.cleanup_expired().await?;
    Ok(Json(resp).into_response())
}

fn required_param(value: Option<String>, name: &str) -> Result<String, RelayError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Validation(format!("{name} is required")))
}
