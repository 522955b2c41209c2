//! In-memory implementation of [`KvStore`].
//!
//! Backs tests and token-less local runs. The whole store sits behind one
//! mutex, so script execution is atomic with respect to every other
//! operation, the same contract the REST backend gets from server-side
//! script evaluation.

use super::{KvError, KvScript, KvStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

/// In-process KV store.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::Protocol(format!("wrong entry type for key {key}"))
}

/// Normalize LRANGE/LTRIM-style indices against a list length.
fn range_bounds(len: usize, start: i64, stop: i64) -> (usize, usize) {
    let len = len as i64;
    let norm = |i: i64| if i < 0 { len + i } else { i };
    let start = norm(start).clamp(0, len);
    // stop is inclusive
    let stop = (norm(stop) + 1).clamp(0, len);
    (start as usize, stop.max(start) as usize)
}

/// Glob match supporting only `*` wildcards.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn lock_field(raw: &str, field: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get(field).cloned())
}

fn lock_is_active(raw: &str, now: i64) -> bool {
    lock_field(raw, "expiry")
        .and_then(|v| v.as_i64())
        .map(|expiry| now < expiry)
        .unwrap_or(false)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let data = self.data.lock().await;
        match data.get(key) {
            None => Ok(None),
            Some(Entry::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), Entry::Str(value.to_string()));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        let mut data = self.data.lock().await;
        Ok(data.remove(key).is_some() as u64)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        let data = self.data.lock().await;
        match data.get(key) {
            None => Ok(None),
            Some(Entry::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, entries: &[(String, String)]) -> Result<(), KvError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut data = self.data.lock().await;
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry {
            Entry::Hash(h) => {
                for (field, value) in entries {
                    h.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, KvError> {
        let mut data = self.data.lock().await;
        match data.get_mut(key) {
            None => Ok(0),
            Some(Entry::Hash(h)) => {
                let mut removed = 0;
                for field in fields {
                    if h.remove(field).is_some() {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let data = self.data.lock().await;
        match data.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn lpush(&self, key: &str, values: &[String]) -> Result<u64, KvError> {
        let mut data = self.data.lock().await;
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => {
                for value in values {
                    list.push_front(value.clone());
                }
                Ok(list.len() as u64)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), KvError> {
        let mut data = self.data.lock().await;
        match data.get_mut(key) {
            None => Ok(()),
            Some(Entry::List(list)) => {
                let (start, stop) = range_bounds(list.len(), start, stop);
                let kept: VecDeque<String> = list
                    .iter()
                    .skip(start)
                    .take(stop - start)
                    .cloned()
                    .collect();
                *list = kept;
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        let data = self.data.lock().await;
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => {
                let (start, stop) = range_bounds(list.len(), start, stop);
                Ok(list.iter().skip(start).take(stop - start).cloned().collect())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn llen(&self, key: &str) -> Result<u64, KvError> {
        let data = self.data.lock().await;
        match data.get(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let data = self.data.lock().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn eval(
        &self,
        script: KvScript,
        keys: &[String],
        args: &[String],
    ) -> Result<Value, KvError> {
        // One lock for the whole script: this is the atomicity contract.
        let mut data = self.data.lock().await;

        let arg = |i: usize| -> Result<&String, KvError> {
            args.get(i)
                .ok_or_else(|| KvError::Protocol(format!("script missing arg {i}")))
        };
        let key_at = |i: usize| -> Result<&String, KvError> {
            keys.get(i)
                .ok_or_else(|| KvError::Protocol(format!("script missing key {i}")))
        };

        match script {
            KvScript::AcquireLocks => {
                let ns = key_at(0)?.clone();
                let now: i64 = arg(0)?
                    .parse()
                    .map_err(|_| KvError::Protocol("bad now_ms".into()))?;
                let caller = arg(1)?.clone();
                let n: usize = arg(2)?
                    .parse()
                    .map_err(|_| KvError::Protocol("bad path count".into()))?;
                if args.len() < 3 + 2 * n {
                    return Err(KvError::Protocol("truncated acquire args".into()));
                }
                let paths = &args[3..3 + n];
                let records = &args[3 + n..3 + 2 * n];

                if let Some(Entry::Hash(h)) = data.get(&ns) {
                    for path in paths {
                        if let Some(raw) = h.get(path) {
                            let active = lock_is_active(raw, now);
                            let owner = lock_field(raw, "user_id")
                                .and_then(|v| v.as_str().map(str::to_string));
                            if active && owner.as_deref() != Some(caller.as_str()) {
                                let owner_name = lock_field(raw, "user_name")
                                    .and_then(|v| v.as_str().map(str::to_string));
                                return Ok(Value::String(
                                    json!({
                                        "ok": false,
                                        "file": path,
                                        "owner": owner,
                                        "owner_name": owner_name,
                                    })
                                    .to_string(),
                                ));
                            }
                        }
                    }
                }

                let entry = data
                    .entry(ns.clone())
                    .or_insert_with(|| Entry::Hash(HashMap::new()));
                match entry {
                    Entry::Hash(h) => {
                        for (path, record) in paths.iter().zip(records) {
                            h.insert(path.clone(), record.clone());
                        }
                    }
                    _ => return Err(wrong_type(&ns)),
                }
                Ok(Value::String(json!({ "ok": true }).to_string()))
            }

            KvScript::ReleaseOwned => {
                let ns = key_at(0)?;
                let caller = arg(0)?;
                let mut removed = 0u64;
                if let Some(Entry::Hash(h)) = data.get_mut(ns) {
                    for path in &args[1..] {
                        let owned = h
                            .get(path)
                            .and_then(|raw| lock_field(raw, "user_id"))
                            .and_then(|v| v.as_str().map(str::to_string))
                            .is_some_and(|owner| owner == *caller);
                        if owned {
                            h.remove(path);
                            removed += 1;
                        }
                    }
                }
                Ok(json!(removed))
            }

            KvScript::ReleaseAll => {
                let ns = key_at(0)?;
                let count = match data.remove(ns) {
                    Some(Entry::Hash(h)) => h.len() as u64,
                    Some(other) => {
                        data.insert(ns.clone(), other);
                        return Err(wrong_type(ns));
                    }
                    None => 0,
                };
                Ok(json!(count))
            }

            KvScript::CleanupExpired => {
                let ns = key_at(0)?;
                let now: i64 = arg(0)?
                    .parse()
                    .map_err(|_| KvError::Protocol("bad now_ms".into()))?;
                let mut removed = 0u64;
                if let Some(Entry::Hash(h)) = data.get_mut(ns) {
                    let stale: Vec<String> = h
                        .iter()
                        .filter(|(_, raw)| !lock_is_active(raw, now))
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in stale {
                        h.remove(&path);
                        removed += 1;
                    }
                }
                Ok(json!(removed))
            }

            KvScript::ClearNamespace => {
                let locks_key = key_at(0)?;
                let feed_key = key_at(1)?;
                let locks_cleared = match data.remove(locks_key) {
                    Some(Entry::Hash(h)) => h.len() as u64,
                    _ => 0,
                };
                let feed_cleared = match data.remove(feed_key) {
                    Some(Entry::List(list)) => list.len() as u64,
                    _ => 0,
                };
                Ok(Value::String(
                    json!({ "locks_cleared": locks_cleared, "feed_cleared": feed_cleared })
                        .to_string(),
                ))
            }

            KvScript::CommitGraph => {
                let graph_key = key_at(0)?.clone();
                let meta_key = key_at(1)?.clone();
                let shas_key = key_at(2)?.clone();
                let graph_json = arg(0)?.clone();
                let head = arg(1)?.clone();
                let ndel: usize = arg(2)?
                    .parse()
                    .map_err(|_| KvError::Protocol("bad delete count".into()))?;
                if args.len() < 3 + ndel {
                    return Err(KvError::Protocol("truncated commit args".into()));
                }
                let deleted = &args[3..3 + ndel];
                let pairs = &args[3 + ndel..];

                data.insert(graph_key, Entry::Str(graph_json));
                data.insert(meta_key, Entry::Str(head));
                let entry = data
                    .entry(shas_key.clone())
                    .or_insert_with(|| Entry::Hash(HashMap::new()));
                match entry {
                    Entry::Hash(h) => {
                        for path in deleted {
                            h.remove(path);
                        }
                        for pair in pairs.chunks(2) {
                            if let [path, sha] = pair {
                                h.insert(path.clone(), sha.clone());
                            }
                        }
                    }
                    _ => return Err(wrong_type(&shas_key)),
                }
                Ok(Value::String("OK".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_roundtrip() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("1".into()));
        assert_eq!(kv.del("a").await.unwrap(), 1);
        assert_eq!(kv.del("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hash_ops() {
        let kv = MemoryKvStore::new();
        kv.hset("h", &[("f1".into(), "v1".into()), ("f2".into(), "v2".into())])
            .await
            .unwrap();
        assert_eq!(kv.hget("h", "f1").await.unwrap(), Some("v1".into()));
        assert_eq!(kv.hgetall("h").await.unwrap().len(), 2);
        assert_eq!(kv.hdel("h", &["f1".into(), "missing".into()]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_push_trim_range() {
        let kv = MemoryKvStore::new();
        for i in 0..5 {
            kv.lpush("l", &[format!("e{i}")]).await.unwrap();
        }
        // Newest first.
        assert_eq!(
            kv.lrange("l", 0, 1).await.unwrap(),
            vec!["e4".to_string(), "e3".to_string()]
        );
        kv.ltrim("l", 0, 2).await.unwrap();
        assert_eq!(kv.llen("l").await.unwrap(), 3);
        assert_eq!(
            kv.lrange("l", 0, -1).await.unwrap(),
            vec!["e4".to_string(), "e3".to_string(), "e2".to_string()]
        );
    }

    #[tokio::test]
    async fn keys_glob() {
        let kv = MemoryKvStore::new();
        kv.set("locks:r1:main", "x").await.unwrap();
        kv.set("locks:r2:main", "x").await.unwrap();
        kv.set("graph:r1:main", "x").await.unwrap();
        let keys = kv.keys("locks:*").await.unwrap();
        assert_eq!(keys, vec!["locks:r1:main", "locks:r2:main"]);
    }

    #[test]
    fn glob_match_variants() {
        assert!(glob_match("locks:*", "locks:a:b"));
        assert!(!glob_match("locks:*", "graph:a:b"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*c", "abc"));
        assert!(!glob_match("a*c", "abd"));
        assert!(glob_match("exact", "exact"));
    }
}
