//! The coordination facade.
//!
//! Owns the hot-path composition (validate, resolve identity, read the
//! remote head, read locks, consult the cached graph, decide) and is
//! shared by the plain JSON endpoints and the agent tool adapter, so both
//! surfaces dispatch to exactly the same operations.

pub mod models;

use crate::activity::{events_for_transition, ActivityLog, EditorStatus, ACTIVITY_DEFAULT_LIMIT};
use crate::error::RelayError;
use crate::github::{parse_repo_coordinates, RepoCoordinates, RepoHost};
use crate::graph::{GraphService, GraphView};
use crate::identity::{now_ms, Identity};
use crate::kv::{KvScript, KvStore};
use crate::locks::{AcquireOutcome, AcquireRequest, LockRegistry};
use crate::orchestration::{
    acquire_conflict, decide_check, tag_locks, OrchestrationCommand,
};
use crate::Namespace;
use models::*;
use serde_json::Value;
use std::sync::Arc;

/// Free-text messages are bounded.
const MESSAGE_MAX: usize = 500;
/// Activity reads are capped at the retention bound.
const ACTIVITY_MAX_LIMIT: usize = 500;

pub struct Coordinator {
    host: Arc<dyn RepoHost>,
    kv: Arc<dyn KvStore>,
    locks: Arc<LockRegistry>,
    graphs: Arc<GraphService>,
    activity: ActivityLog,
    strict_identity: bool,
}

impl Coordinator {
    pub fn new(
        host: Arc<dyn RepoHost>,
        kv: Arc<dyn KvStore>,
        locks: Arc<LockRegistry>,
        graphs: Arc<GraphService>,
        strict_identity: bool,
    ) -> Self {
        let activity = ActivityLog::new(kv.clone());
        Self {
            host,
            kv,
            locks,
            graphs,
            activity,
            strict_identity,
        }
    }

    fn namespace(
        &self,
        repo_url: &str,
        branch: &str,
    ) -> Result<(Namespace, RepoCoordinates), RelayError> {
        let coords = parse_repo_coordinates(repo_url)?;
        let normalized = crate::github::normalize_repo_url(repo_url)?;
        Ok((Namespace::new(normalized, branch), coords))
    }

    /// `check_status`: is the caller current, and is anything they (or
    /// their neighbors) touch claimed by someone else?
    pub async fn check_status(
        &self,
        identity: &Identity,
        req: &CheckStatusRequest,
    ) -> Result<CheckStatusResponse, RelayError> {
        let repo_url = require_str(&req.repo_url, "repo_url")?;
        let branch = require_str(&req.branch, "branch")?;
        let agent_head = require_str(&req.agent_head, "agent_head")?;
        let file_paths = require_paths(&req.file_paths)?;

        let (ns, coords) = self.namespace(&repo_url, &branch)?;
        let remote_head = self
            .host
            .branch_head(&coords.owner, &coords.repo, &branch)
            .await?;

        let active = self.locks.list(&ns, now_ms()).await?;
        // Read-only graph consult; never triggers a remote fetch.
        let graph = self.graphs.cached_graph(&ns).await?;
        let tagged = tag_locks(&active, &file_paths, graph.as_ref());

        let decision = decide_check(&identity.user_id, &agent_head, &remote_head, &branch, &tagged);

        tracing::debug!(
            namespace = %ns,
            caller = %identity.user_id,
            status = ?decision.status,
            action = ?decision.orchestration.action,
            "check_status"
        );

        Ok(CheckStatusResponse {
            status: decision.status,
            repo_head: remote_head,
            locks: tagged,
            warnings: decision.warnings,
            orchestration: decision.orchestration,
        })
    }

    /// `post_status`: acquire (WRITING/READING), or release (OPEN).
    pub async fn post_status(
        &self,
        identity: &Identity,
        req: &PostStatusRequest,
    ) -> Result<PostStatusOutcome, RelayError> {
        let repo_url = require_str(&req.repo_url, "repo_url")?;
        let branch = require_str(&req.branch, "branch")?;
        let file_paths = require_paths(&req.file_paths)?;
        let status = parse_status(&req.status)?;
        let message = match &req.message {
            Some(message) => bound_message(message),
            None => return Err(RelayError::Validation("message is required".into())),
        };

        if self.strict_identity && identity.is_anonymous() {
            return Err(RelayError::IdentityUnresolved);
        }

        let (ns, coords) = self.namespace(&repo_url, &branch)?;

        match status.as_lock_status() {
            Some(lock_status) => {
                let agent_head = require_str(&req.agent_head, "agent_head")?;
                let remote_head = self
                    .host
                    .branch_head(&coords.owner, &coords.repo, &branch)
                    .await?;

                // READING is advisory presence; a stale head only blocks
                // writers.
                if status == EditorStatus::Writing && agent_head != remote_head {
                    return Ok(PostStatusOutcome::Ok(PostStatusResponse::failure(
                        OrchestrationCommand::pull(&branch, &remote_head),
                    )));
                }

                let now = now_ms();
                let outcome = self
                    .locks
                    .acquire(
                        &ns,
                        &AcquireRequest {
                            paths: file_paths.clone(),
                            user_id: identity.user_id.clone(),
                            user_name: identity.user_name.clone(),
                            status: lock_status,
                            agent_head: agent_head.clone(),
                            message: message.clone(),
                            now,
                        },
                    )
                    .await?;

                match outcome {
                    AcquireOutcome::Conflict { file, owner, .. } => {
                        tracing::debug!(namespace = %ns, caller = %identity.user_id, %file, %owner, "acquire conflict");
                        Ok(PostStatusOutcome::Ok(PostStatusResponse::failure(
                            acquire_conflict(&file, &owner),
                        )))
                    }
                    AcquireOutcome::Acquired(locks) => {
                        let events = events_for_transition(
                            &identity.user_id,
                            &identity.user_name,
                            status,
                            &file_paths,
                            &message,
                            now,
                        );
                        self.activity.record(&ns, &events).await?;

                        Ok(PostStatusOutcome::Ok(PostStatusResponse {
                            success: true,
                            locks: Some(locks),
                            orphaned_dependencies: None,
                            orchestration: OrchestrationCommand::proceed(
                                "Locks acquired; go ahead",
                            ),
                        }))
                    }
                }
            }

            None => {
                // Releasing without advancing the repo means the work was
                // never pushed.
                if let (Some(new_head), Some(agent_head)) = (&req.new_repo_head, &req.agent_head) {
                    if !new_head.trim().is_empty() && new_head == agent_head {
                        return Ok(PostStatusOutcome::Ok(PostStatusResponse::failure(
                            OrchestrationCommand::push(),
                        )));
                    }
                }

                let now = now_ms();
                match self.locks.release(&ns, &file_paths, &identity.user_id).await {
                    Ok(_released) => {
                        let orphaned = self
                            .graphs
                            .cached_graph(&ns)
                            .await?
                            .map(|graph| graph.orphaned_dependents(&file_paths))
                            .unwrap_or_default();

                        let events = events_for_transition(
                            &identity.user_id,
                            &identity.user_name,
                            EditorStatus::Open,
                            &file_paths,
                            &message,
                            now,
                        );
                        self.activity.record(&ns, &events).await?;

                        Ok(PostStatusOutcome::Ok(PostStatusResponse {
                            success: true,
                            locks: None,
                            orphaned_dependencies: Some(orphaned),
                            orchestration: OrchestrationCommand::proceed("Locks released"),
                        }))
                    }
                    Err(e) => {
                        tracing::error!(namespace = %ns, error = %e, "release failed");
                        Ok(PostStatusOutcome::ReleaseFailed(PostStatusResponse::failure(
                            OrchestrationCommand::stop(format!("Release failed: {e}")),
                        )))
                    }
                }
            }
        }
    }

    /// The dependency graph with its lock overlay. `regenerate` forces a
    /// rebuild; otherwise an unmoved branch is served from cache.
    pub async fn graph(
        &self,
        repo_url: &str,
        branch: &str,
        regenerate: bool,
    ) -> Result<GraphView, RelayError> {
        let (ns, coords) = self.namespace(repo_url, branch)?;
        self.graphs.generate(&ns, &coords, regenerate).await
    }

    /// Activity feed, oldest first, bounded by `limit`.
    pub async fn activity(
        &self,
        repo_url: &str,
        branch: &str,
        limit: Option<usize>,
    ) -> Result<ActivityResponse, RelayError> {
        let (ns, _) = self.namespace(repo_url, branch)?;
        let limit = limit
            .unwrap_or(ACTIVITY_DEFAULT_LIMIT)
            .min(ACTIVITY_MAX_LIMIT);
        let mut events = self.activity.recent(&ns, limit).await?;
        // Stored newest-first; UI consumers read oldest-first.
        events.reverse();
        Ok(ActivityResponse {
            activity_events: events,
        })
    }

    pub async fn release_all(
        &self,
        repo_url: &str,
        branch: &str,
    ) -> Result<ReleaseAllResponse, RelayError> {
        let (ns, _) = self.namespace(repo_url, branch)?;
        let released = self.locks.release_all(&ns).await?;
        tracing::info!(namespace = %ns, released, "released all locks");
        Ok(ReleaseAllResponse {
            success: true,
            released,
            repo_url: ns.repo_url.clone(),
            branch: ns.branch.clone(),
        })
    }

    /// Release every lock and clear the feed in one atomic step.
    pub async fn clear(&self, repo_url: &str, branch: &str) -> Result<ClearResponse, RelayError> {
        let (ns, _) = self.namespace(repo_url, branch)?;
        let reply = self
            .kv
            .eval(
                KvScript::ClearNamespace,
                &[ns.locks_key(), ns.activity_key()],
                &[],
            )
            .await?;

        let parsed: Value = match reply {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|e| RelayError::LockStoreUnavailable(format!("bad script reply: {e}")))?,
            other => other,
        };
        let count = |name: &str| parsed.get(name).and_then(Value::as_u64).unwrap_or(0);

        Ok(ClearResponse {
            success: true,
            locks_cleared: count("locks_cleared"),
            feed_cleared: count("feed_cleared"),
        })
    }

    /// Sweep every known lock namespace for expired entries.
    pub async fn cleanup_expired(&self) -> Result<CleanupResponse, RelayError> {
        let now = now_ms();
        let keys = self.kv.keys("locks:*").await?;
        let mut removed = 0;
        for key in &keys {
            removed += self.locks.cleanup_expired_key(key, now).await?;
        }
        tracing::info!(namespaces = keys.len(), removed, "expired lock sweep");
        Ok(CleanupResponse {
            success: true,
            removed,
            namespaces: keys.len() as u64,
        })
    }
}

fn require_str(value: &Option<String>, name: &str) -> Result<String, RelayError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RelayError::Validation(format!("{name} is required")))
}

fn require_paths(value: &Option<Vec<String>>) -> Result<Vec<String>, RelayError> {
    let paths: Vec<String> = value
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return Err(RelayError::Validation(
            "file_paths must be a non-empty array".into(),
        ));
    }
    Ok(paths)
}

fn parse_status(value: &Option<String>) -> Result<EditorStatus, RelayError> {
    match value.as_deref().map(str::trim) {
        Some("OPEN") => Ok(EditorStatus::Open),
        Some("READING") => Ok(EditorStatus::Reading),
        Some("WRITING") => Ok(EditorStatus::Writing),
        Some(other) => Err(RelayError::Validation(format!(
            "status must be OPEN, READING or WRITING, got {other:?}"
        ))),
        None => Err(RelayError::Validation("status is required".into())),
    }
}

fn bound_message(message: &str) -> String {
    if message.chars().count() <= MESSAGE_MAX {
        message.to_string()
    } else {
        message.chars().take(MESSAGE_MAX).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_rejects_unknown_values() {
        assert!(parse_status(&Some("WRITING".into())).is_ok());
        assert!(parse_status(&Some("DELETING".into())).is_err());
        assert!(parse_status(&None).is_err());
    }

    #[test]
    fn messages_are_bounded() {
        let long = "x".repeat(2 * MESSAGE_MAX);
        assert_eq!(bound_message(&long).len(), MESSAGE_MAX);
        assert_eq!(bound_message("short"), "short");
    }

    #[test]
    fn paths_are_trimmed_and_required() {
        assert!(require_paths(&None).is_err());
        assert!(require_paths(&Some(vec!["  ".into()])).is_err());
        assert_eq!(
            require_paths(&Some(vec![" a.ts ".into()])).unwrap(),
            vec!["a.ts".to_string()]
        );
    }
}
