//! Lock registry operations over the KV store.

use super::models::{AcquireOutcome, AcquireRequest, Lock, LOCK_TTL_MS};
use crate::error::RelayError;
use crate::kv::{KvScript, KvStore};
use crate::Namespace;
use anyhow::anyhow;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registry of per-file locks, one hash per namespace.
pub struct LockRegistry {
    kv: Arc<dyn KvStore>,
}

impl LockRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Acquire every requested path or none.
    ///
    /// Expired locks do not block. Re-acquiring one's own locks succeeds
    /// and refreshes `timestamp`/`expiry`. On conflict the first blocking
    /// file and its owner are reported and nothing is written.
    pub async fn acquire(
        &self,
        ns: &Namespace,
        req: &AcquireRequest,
    ) -> Result<AcquireOutcome, RelayError> {
        let paths = dedup_paths(&req.paths);
        let locks: Vec<Lock> = paths
            .iter()
            .map(|path| Lock {
                file_path: path.clone(),
                user_id: req.user_id.clone(),
                user_name: req.user_name.clone(),
                status: req.status,
                agent_head: req.agent_head.clone(),
                message: req.message.clone(),
                timestamp: req.now,
                expiry: req.now + LOCK_TTL_MS,
            })
            .collect();

        let mut args = vec![
            req.now.to_string(),
            req.user_id.clone(),
            paths.len().to_string(),
        ];
        args.extend(paths.iter().cloned());
        for lock in &locks {
            args.push(serde_json::to_string(lock).map_err(|e| RelayError::Internal(anyhow!(e)))?);
        }

        let result = self
            .kv
            .eval(KvScript::AcquireLocks, &[ns.locks_key()], &args)
            .await?;

        let reply: Value = match result {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|e| RelayError::LockStoreUnavailable(format!("bad script reply: {e}")))?,
            other => other,
        };

        if reply.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(AcquireOutcome::Acquired(locks));
        }

        let field = |name: &str| {
            reply
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(AcquireOutcome::Conflict {
            file: field("file"),
            owner: field("owner"),
            owner_name: field("owner_name"),
        })
    }

    /// Release the caller's locks on `paths`. Fields owned by other users
    /// are left untouched; releasing a missing lock is a no-op.
    pub async fn release(
        &self,
        ns: &Namespace,
        paths: &[String],
        user_id: &str,
    ) -> Result<u64, RelayError> {
        let mut args = vec![user_id.to_string()];
        args.extend(dedup_paths(paths));
        let result = self
            .kv
            .eval(KvScript::ReleaseOwned, &[ns.locks_key()], &args)
            .await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    /// Drop the whole namespace, returning how many locks existed.
    pub async fn release_all(&self, ns: &Namespace) -> Result<u64, RelayError> {
        let result = self
            .kv
            .eval(KvScript::ReleaseAll, &[ns.locks_key()], &[])
            .await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    /// All active locks in the namespace, keyed by file path.
    ///
    /// Expired or unparsable fields are skipped and opportunistically
    /// pruned; pruning failures are ignored.
    pub async fn list(&self, ns: &Namespace, now: i64) -> Result<HashMap<String, Lock>, RelayError> {
        let raw = self.kv.hgetall(&ns.locks_key()).await?;

        let mut locks = HashMap::with_capacity(raw.len());
        let mut stale: Vec<String> = Vec::new();
        for (path, value) in raw {
            match serde_json::from_str::<Lock>(&value) {
                Ok(lock) if lock.is_active(now) => {
                    locks.insert(path, lock);
                }
                _ => stale.push(path),
            }
        }

        if !stale.is_empty() {
            if let Err(e) = self.kv.hdel(&ns.locks_key(), &stale).await {
                tracing::debug!(error = %e, "failed to prune expired locks");
            }
        }
        Ok(locks)
    }

    /// Remove expired fields from one namespace hash (addressed by raw key
    /// so the cleanup job can drive it from a `locks:*` listing).
    pub async fn cleanup_expired_key(&self, locks_key: &str, now: i64) -> Result<u64, RelayError> {
        let result = self
            .kv
            .eval(
                KvScript::CleanupExpired,
                &[locks_key.to_string()],
                &[now.to_string()],
            )
            .await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    pub async fn cleanup_expired(&self, ns: &Namespace, now: i64) -> Result<u64, RelayError> {
        self.cleanup_expired_key(&ns.locks_key(), now).await
    }
}

/// Collapse duplicate request paths, preserving first-seen order.
fn dedup_paths(paths: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}
