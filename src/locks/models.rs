//! Lock records and acquire outcomes.

use serde::{Deserialize, Serialize};

/// How long a lock lives without renewal.
pub const LOCK_TTL_MS: i64 = 300_000;

/// Lock intent. Both states share the same exclusion rule (one holder per
/// file) but stay distinct for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    Reading,
    Writing,
}

/// A lock on one file within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub file_path: String,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    pub agent_head: String,
    pub message: String,
    /// Assigned by the service at acquire time, ms since epoch.
    pub timestamp: i64,
    /// `timestamp + LOCK_TTL_MS`.
    pub expiry: i64,
}

impl Lock {
    /// A lock is active strictly before its expiry; at `expiry` it is
    /// invisible to reads and non-blocking to acquisitions.
    pub fn is_active(&self, now: i64) -> bool {
        now < self.expiry
    }
}

/// Inputs for a multi-file acquire.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub paths: Vec<String>,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    pub agent_head: String,
    pub message: String,
    pub now: i64,
}

/// Result of an acquire. A conflict is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    Acquired(Vec<Lock>),
    Conflict {
        file: String,
        owner: String,
        owner_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&LockStatus::Writing).unwrap(),
            "\"WRITING\""
        );
        assert_eq!(
            serde_json::from_str::<LockStatus>("\"READING\"").unwrap(),
            LockStatus::Reading
        );
    }

    #[test]
    fn active_is_strict() {
        let lock = Lock {
            file_path: "src/a.ts".into(),
            user_id: "u".into(),
            user_name: "u".into(),
            status: LockStatus::Writing,
            agent_head: "sha".into(),
            message: String::new(),
            timestamp: 1000,
            expiry: 1000 + LOCK_TTL_MS,
        };
        assert!(lock.is_active(1000 + LOCK_TTL_MS - 1));
        assert!(!lock.is_active(1000 + LOCK_TTL_MS));
    }
}
