//! Activity feed: bounded newest-first list of status transitions per
//! namespace.

use crate::error::RelayError;
use crate::kv::KvStore;
use crate::locks::LockStatus;
use crate::Namespace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Entries retained per namespace; older entries fall off on push.
pub const ACTIVITY_RETAINED: i64 = 500;
/// Default number of events a read returns.
pub const ACTIVITY_DEFAULT_LIMIT: usize = 120;

/// Editor state transition. `OPEN` releases; the other two acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditorStatus {
    Open,
    Reading,
    Writing,
}

impl EditorStatus {
    /// The lock state this transition records, if any.
    pub fn as_lock_status(&self) -> Option<LockStatus> {
        match self {
            EditorStatus::Open => None,
            EditorStatus::Reading => Some(LockStatus::Reading),
            EditorStatus::Writing => Some(LockStatus::Writing),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            EditorStatus::Open => "OPEN",
            EditorStatus::Reading => "READING",
            EditorStatus::Writing => "WRITING",
        }
    }
}

/// One feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Deterministic synthesis of timestamp, user, status, path, and index.
    pub id: String,
    pub file_path: String,
    pub user_id: String,
    pub user_name: String,
    pub status: EditorStatus,
    pub message: String,
    pub timestamp: i64,
}

/// Builds one event per affected file for a state-changing `post_status`.
pub fn events_for_transition(
    user_id: &str,
    user_name: &str,
    status: EditorStatus,
    paths: &[String],
    message: &str,
    now: i64,
) -> Vec<ActivityEvent> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| ActivityEvent {
            id: format!("{now}-{user_id}-{}-{path}-{index}", status.as_str()),
            file_path: path.clone(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            status,
            message: message.to_string(),
            timestamp: now,
        })
        .collect()
}

/// Feed storage: `activity:<repo>:<branch>`, newest first, trimmed.
pub struct ActivityLog {
    kv: Arc<dyn KvStore>,
}

impl ActivityLog {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Push events to the head of the feed and trim to the retention cap.
    pub async fn record(&self, ns: &Namespace, events: &[ActivityEvent]) -> Result<(), RelayError> {
        if events.is_empty() {
            return Ok(());
        }
        let serialized: Vec<String> = events
            .iter()
            .map(|e| serde_json::to_string(e))
            .collect::<Result<_, _>>()
            .map_err(|e| RelayError::Internal(anyhow::anyhow!(e)))?;

        let key = ns.activity_key();
        self.kv.lpush(&key, &serialized).await?;
        self.kv.ltrim(&key, 0, ACTIVITY_RETAINED - 1).await?;
        Ok(())
    }

    /// The newest `limit` events, newest first. Unparsable entries are
    /// skipped.
    pub async fn recent(&self, ns: &Namespace, limit: usize) -> Result<Vec<ActivityEvent>, RelayError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .kv
            .lrange(&ns.activity_key(), 0, limit as i64 - 1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }
}
