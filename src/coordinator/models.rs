//! Request and response shapes for the coordination operations.
//!
//! Request fields are all optional at the serde layer so that missing
//! inputs surface as uniform validation errors instead of body-rejection
//! noise; unknown top-level keys are ignored, unknown status values are
//! rejected during validation.

use crate::activity::ActivityEvent;
use crate::locks::Lock;
use crate::orchestration::{CheckStatusLabel, OrchestrationCommand, TaggedLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckStatusRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub file_paths: Option<Vec<String>>,
    pub agent_head: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckStatusResponse {
    pub status: CheckStatusLabel,
    pub repo_head: String,
    pub locks: HashMap<String, TaggedLock>,
    /// Present iff the caller's head is stale.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub orchestration: OrchestrationCommand,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostStatusRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub file_paths: Option<Vec<String>>,
    /// `OPEN`, `READING`, or `WRITING`; anything else is rejected.
    pub status: Option<String>,
    pub message: Option<String>,
    pub agent_head: Option<String>,
    pub new_repo_head: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostStatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locks: Option<Vec<Lock>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphaned_dependencies: Option<Vec<String>>,
    pub orchestration: OrchestrationCommand,
}

impl PostStatusResponse {
    pub fn failure(orchestration: OrchestrationCommand) -> Self {
        Self {
            success: false,
            locks: None,
            orphaned_dependencies: None,
            orchestration,
        }
    }
}

/// Outcome of `post_status`: a release failure keeps its structured body
/// but must travel as HTTP 500.
#[derive(Debug, Clone)]
pub enum PostStatusOutcome {
    Ok(PostStatusResponse),
    ReleaseFailed(PostStatusResponse),
}

impl PostStatusOutcome {
    pub fn body(&self) -> &PostStatusResponse {
        match self {
            PostStatusOutcome::Ok(body) | PostStatusOutcome::ReleaseFailed(body) => body,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityResponse {
    pub activity_events: Vec<ActivityEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseAllResponse {
    pub success: bool,
    pub released: u64,
    pub repo_url: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub locks_cleared: u64,
    pub feed_cleared: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub removed: u64,
    pub namespaces: u64,
}
