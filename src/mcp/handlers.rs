//! MCP Tool handlers
//!
//! Adapts tool-call arguments onto the coordinator and folds every
//! infrastructure failure into a constant `orchestration_command` envelope,
//! so downstream agents always see the same shape.

use super::protocol::ToolCallResult;
use crate::coordinator::models::{CheckStatusRequest, PostStatusOutcome, PostStatusRequest};
use crate::error::RelayError;
use crate::identity::{Identity, ANONYMOUS};
use crate::orchestration::OrchestrationCommand;
use crate::AppState;
use serde_json::{json, Value};

/// Agents that omit `branch` get this first.
const DEFAULT_BRANCH: &str = "master";
/// One retry on a branch-not-found signal.
const FALLBACK_BRANCH: &str = "main";

/// Handles MCP tool calls
pub struct ToolHandler {
    state: AppState,
}

impl ToolHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Handle a tool call and return the result envelope.
    pub async fn handle(&self, name: &str, args: Option<Value>) -> ToolCallResult {
        let args = args.unwrap_or_else(|| json!({}));

        match name {
            "check_status" => self.check_status(&args).await,
            "post_status" => self.post_status(&args).await,
            _ => ToolCallResult::error(format!("Unknown tool: {name}")),
        }
    }

    /// The deployment may pin every agent onto one canonical repo URL.
    fn effective_repo_url(&self, args: &Value) -> Option<String> {
        self.state
            .config
            .canonical_repo_url
            .clone()
            .or_else(|| str_arg(args, "repo_url"))
    }

    async fn check_status(&self, args: &Value) -> ToolCallResult {
        let identity = identity_from_args(args);
        let branch_given = str_arg(args, "branch");
        let branch = branch_given
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let req = CheckStatusRequest {
            repo_url: self.effective_repo_url(args),
            branch: Some(branch),
            file_paths: paths_arg(args),
            agent_head: str_arg(args, "agent_head"),
        };

        let mut result = self.state.coordinator.check_status(&identity, &req).await;
        if branch_given.is_none() {
            if let Err(RelayError::BranchNotFound(_)) = result {
                let retry = CheckStatusRequest {
                    branch: Some(FALLBACK_BRANCH.to_string()),
                    ..req
                };
                result = self.state.coordinator.check_status(&identity, &retry).await;
            }
        }

        match result {
            Ok(resp) => {
                ToolCallResult::success(serde_json::to_value(resp).unwrap_or_default())
            }
            Err(e) => ToolCallResult::success(check_offline_envelope(e)),
        }
    }

    async fn post_status(&self, args: &Value) -> ToolCallResult {
        let identity = identity_from_args(args);
        let branch_given = str_arg(args, "branch");
        let branch = branch_given
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let req = PostStatusRequest {
            repo_url: self.effective_repo_url(args),
            branch: Some(branch),
            file_paths: paths_arg(args),
            status: str_arg(args, "status"),
            message: args
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            agent_head: str_arg(args, "agent_head"),
            new_repo_head: str_arg(args, "new_repo_head"),
        };

        let mut result = self.state.coordinator.post_status(&identity, &req).await;
        if branch_given.is_none() {
            if let Err(RelayError::BranchNotFound(_)) = result {
                let retry = PostStatusRequest {
                    branch: Some(FALLBACK_BRANCH.to_string()),
                    ..req
                };
                result = self.state.coordinator.post_status(&identity, &retry).await;
            }
        }

        match result {
            // A release failure already carries its STOP orchestration.
            Ok(PostStatusOutcome::Ok(body)) | Ok(PostStatusOutcome::ReleaseFailed(body)) => {
                ToolCallResult::success(serde_json::to_value(body).unwrap_or_default())
            }
            Err(e) => ToolCallResult::success(post_offline_envelope(e)),
        }
    }
}

/// Normalize the `username` argument into both identity roles.
fn identity_from_args(args: &Value) -> Identity {
    let normalized = args
        .get("username")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string();
    Identity {
        user_id: normalized.clone(),
        user_name: normalized,
    }
}

fn str_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn paths_arg(args: &Value) -> Option<Vec<String>> {
    args.get("file_paths").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn check_envelope(warning: String, orchestration: OrchestrationCommand) -> Value {
    json!({
        "status": "OFFLINE",
        "repo_head": "unknown",
        "locks": {},
        "warnings": [warning],
        "orchestration": serde_json::to_value(orchestration).unwrap_or_default(),
    })
}

fn check_offline_envelope(error: RelayError) -> Value {
    match error {
        RelayError::QuotaExhausted { retry_after_ms } => {
            let reason = match retry_after_ms {
                Some(ms) => format!("Rate limited - retry after {ms} ms"),
                None => "Rate limited - retry later".to_string(),
            };
            check_envelope(
                "RATE_LIMITED: GitHub API quota exhausted".to_string(),
                OrchestrationCommand::stop(reason),
            )
        }
        RelayError::Validation(details) => check_envelope(
            format!("REQUEST_REJECTED: {details}"),
            OrchestrationCommand::stop(format!("Validation error: {details}")),
        ),
        RelayError::IdentityUnresolved | RelayError::InvalidRepoUrl(_) => {
            let details = error.to_string();
            check_envelope(
                format!("REQUEST_REJECTED: {details}"),
                OrchestrationCommand::stop(format!("Validation error: {details}")),
            )
        }
        RelayError::Unreachable(_) => check_envelope(
            "OFFLINE_MODE: Relay backend unreachable".to_string(),
            OrchestrationCommand::switch_task("System Offline"),
        ),
        other => {
            let details = other.to_string();
            check_envelope(
                format!("HTTP_ERROR: {details}"),
                OrchestrationCommand::stop(format!("check_status failed (500): {details}")),
            )
        }
    }
}

fn post_envelope(orchestration: OrchestrationCommand) -> Value {
    json!({
        "success": false,
        "orchestration": serde_json::to_value(orchestration).unwrap_or_default(),
    })
}

fn post_offline_envelope(error: RelayError) -> Value {
    match error {
        RelayError::QuotaExhausted { .. } => {
            post_envelope(OrchestrationCommand::stop("Rate limited - retry later"))
        }
        RelayError::Validation(details) => {
            post_envelope(OrchestrationCommand::stop(format!(
                "Validation error: {details}"
            )))
        }
        RelayError::IdentityUnresolved | RelayError::InvalidRepoUrl(_) => {
            post_envelope(OrchestrationCommand::stop(format!(
                "Validation error: {error}"
            )))
        }
        RelayError::Unreachable(_) => post_envelope(OrchestrationCommand::stop(
            "Relay offline - cannot acquire lock",
        )),
        other => post_envelope(OrchestrationCommand::stop(format!(
            "post_status failed (500): {other}"
        ))),
    }
}
