//! Service error types and their HTTP mapping.
//!
//! Business outcomes (stale head, lock conflict, push-needed) are never
//! errors; they travel as `success: false` responses with an orchestration
//! command. Only validation, transport, and infrastructure faults reach
//! this module.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Transport-neutral error kinds.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Missing or malformed request inputs. Surfaces as HTTP 400.
    #[error("Missing required fields")]
    Validation(String),

    /// A write path received an empty identity while strict mode is on.
    #[error("Identity could not be resolved from request headers")]
    IdentityUnresolved,

    /// The repo URL is not a recognizable host URL.
    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    /// The remote host does not know this branch.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// Remote host API quota exhausted. Surfaces as HTTP 429.
    #[error("Repository host rate limit exceeded")]
    QuotaExhausted { retry_after_ms: Option<u64> },

    /// Remote host unavailable or timed out.
    #[error("Repository host unreachable: {0}")]
    Unreachable(String),

    /// KV store transport or script failure.
    #[error("Lock store unavailable: {0}")]
    LockStoreUnavailable(String),

    /// Anything else, logged with context.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            RelayError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Missing required fields", "details": details }),
            ),
            RelayError::IdentityUnresolved => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string() }),
            ),
            RelayError::InvalidRepoUrl(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string() }),
            ),
            RelayError::QuotaExhausted { retry_after_ms } => {
                let mut body = json!({
                    "error": "Rate limit exceeded",
                    "details": "GitHub API quota exhausted",
                });
                if let Some(ms) = retry_after_ms {
                    body["retry_after_ms"] = json!(ms);
                }
                (StatusCode::TOO_MANY_REQUESTS, body)
            }
            // The tool adapter matches on this message for the main/master
            // branch fallback.
            RelayError::BranchNotFound(branch) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("Branch not found: {branch}") }),
            ),
            RelayError::Unreachable(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Repository host unreachable", "details": details }),
            ),
            RelayError::LockStoreUnavailable(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Lock store unavailable", "details": details }),
            ),
            RelayError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal error", "details": e.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exhausted_carries_retry_hint() {
        let err = RelayError::QuotaExhausted {
            retry_after_ms: Some(1500),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = RelayError::Validation("file_paths is empty".into());
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
