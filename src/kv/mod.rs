//! Key/value store abstraction.
//!
//! The lock registry, graph cache, and activity feed all live in a single
//! KV namespace per `(repo, branch)`. The store must provide string, hash,
//! and list primitives plus atomic script execution over multiple keys;
//! the lock registry's all-or-nothing acquire depends on it.
//!
//! Two implementations:
//! - [`rest::RestKvClient`] speaks the Upstash-compatible REST protocol of
//!   the hosted store behind `KV_URL` / `KV_TOKEN`.
//! - [`memory::MemoryKvStore`] is an in-process store used by tests and
//!   local runs; scripts execute inside one critical section, preserving
//!   the same atomicity contract.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub use memory::MemoryKvStore;
pub use rest::RestKvClient;

/// KV transport / protocol failure.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv transport error: {0}")]
    Transport(String),
    #[error("kv protocol error: {0}")]
    Protocol(String),
}

impl From<KvError> for crate::error::RelayError {
    fn from(err: KvError) -> Self {
        crate::error::RelayError::LockStoreUnavailable(err.to_string())
    }
}

/// The closed set of server-side scripts the service executes.
///
/// Each variant carries its Lua source for Redis-compatible backends; the
/// in-memory store dispatches on the variant and runs the equivalent
/// operation atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvScript {
    /// All-or-nothing multi-file lock acquisition.
    ///
    /// KEYS: `[locks hash]`. ARGV: `[now_ms, caller_id, n, path*n, lock_json*n]`.
    /// Returns a JSON string: `{"ok":true}` or
    /// `{"ok":false,"file":...,"owner":...,"owner_name":...}`.
    AcquireLocks,
    /// Delete only fields owned by the caller.
    ///
    /// KEYS: `[locks hash]`. ARGV: `[caller_id, path...]`. Returns removed count.
    ReleaseOwned,
    /// Drop the whole namespace, returning the prior lock count.
    ///
    /// KEYS: `[locks hash]`. Returns prior cardinality.
    ReleaseAll,
    /// Remove expired fields. KEYS: `[locks hash]`. ARGV: `[now_ms]`.
    /// Returns removed count.
    CleanupExpired,
    /// Release all locks and clear the activity feed in one step.
    ///
    /// KEYS: `[locks hash, activity list]`. Returns a JSON string
    /// `{"locks_cleared":n,"feed_cleared":m}`.
    ClearNamespace,
    /// Publish a freshly built graph: graph blob, meta head, and the
    /// file-SHA delta land together so observers never see a mix.
    ///
    /// KEYS: `[graph, meta, shas]`.
    /// ARGV: `[graph_json, head, ndel, deleted*ndel, (path, sha)...]`.
    /// Returns `"OK"`.
    CommitGraph,
}

impl KvScript {
    pub fn lua(&self) -> &'static str {
        match self {
            KvScript::AcquireLocks => LUA_ACQUIRE_LOCKS,
            KvScript::ReleaseOwned => LUA_RELEASE_OWNED,
            KvScript::ReleaseAll => LUA_RELEASE_ALL,
            KvScript::CleanupExpired => LUA_CLEANUP_EXPIRED,
            KvScript::ClearNamespace => LUA_CLEAR_NAMESPACE,
            KvScript::CommitGraph => LUA_COMMIT_GRAPH,
        }
    }
}

/// Abstract key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    async fn del(&self, key: &str) -> Result<u64, KvError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError>;
    async fn hset(&self, key: &str, entries: &[(String, String)]) -> Result<(), KvError>;
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, KvError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError>;

    async fn lpush(&self, key: &str, values: &[String]) -> Result<u64, KvError>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), KvError>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError>;
    async fn llen(&self, key: &str) -> Result<u64, KvError>;

    /// Glob-style key listing. Only `*` wildcards are supported.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Execute a script atomically over `keys` with `args`.
    async fn eval(
        &self,
        script: KvScript,
        keys: &[String],
        args: &[String],
    ) -> Result<Value, KvError>;
}

const LUA_ACQUIRE_LOCKS: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local caller = ARGV[2]
local n = tonumber(ARGV[3])
for i = 1, n do
  local path = ARGV[3 + i]
  local raw = redis.call('HGET', key, path)
  if raw then
    local ok, lock = pcall(cjson.decode, raw)
    if ok and lock.expiry and now < tonumber(lock.expiry) and lock.user_id ~= caller then
      return cjson.encode({
        ok = false,
        file = path,
        owner = lock.user_id,
        owner_name = lock.user_name,
      })
    end
  end
end
for i = 1, n do
  redis.call('HSET', key, ARGV[3 + i], ARGV[3 + n + i])
end
return cjson.encode({ ok = true })
"#;

const LUA_RELEASE_OWNED: &str = r#"
local key = KEYS[1]
local caller = ARGV[1]
local removed = 0
for i = 2, #ARGV do
  local raw = redis.call('HGET', key, ARGV[i])
  if raw then
    local ok, lock = pcall(cjson.decode, raw)
    if ok and lock.user_id == caller then
      redis.call('HDEL', key, ARGV[i])
      removed = removed + 1
    end
  end
end
return removed
"#;

const LUA_RELEASE_ALL: &str = r#"
local n = redis.call('HLEN', KEYS[1])
redis.call('DEL', KEYS[1])
return n
"#;

const LUA_CLEANUP_EXPIRED: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local removed = 0
local fields = redis.call('HGETALL', key)
for i = 1, #fields, 2 do
  local ok, lock = pcall(cjson.decode, fields[i + 1])
  if not ok or not lock.expiry or now >= tonumber(lock.expiry) then
    redis.call('HDEL', key, fields[i])
    removed = removed + 1
  end
end
return removed
"#;

const LUA_CLEAR_NAMESPACE: &str = r#"
local locks = redis.call('HLEN', KEYS[1])
local feed = redis.call('LLEN', KEYS[2])
redis.call('DEL', KEYS[1])
redis.call('DEL', KEYS[2])
return cjson.encode({ locks_cleared = locks, feed_cleared = feed })
"#;

const LUA_COMMIT_GRAPH: &str = r#"
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
local ndel = tonumber(ARGV[3])
for i = 1, ndel do
  redis.call('HDEL', KEYS[3], ARGV[3 + i])
end
local i = 4 + ndel
while i < #ARGV do
  redis.call('HSET', KEYS[3], ARGV[i], ARGV[i + 1])
  i = i + 2
end
return 'OK'
"#;
