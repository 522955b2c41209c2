//! Upstash-compatible REST client for [`KvStore`].
//!
//! Each command is posted to the base URL as a JSON array with a bearer
//! token; the server replies `{"result": ...}` or `{"error": "..."}`.
//! `EVAL` ships the Lua source with every call, which keeps the client
//! stateless (no SCRIPT LOAD bookkeeping).

use super::{KvError, KvScript, KvStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// REST client for the hosted KV store behind `KV_URL` / `KV_TOKEN`.
pub struct RestKvClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestKvClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, KvError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KvError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Execute one command, returning the raw `result` value.
    async fn command(&self, cmd: Vec<Value>) -> Result<Value, KvError> {
        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .map_err(|e| KvError::Transport(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| KvError::Protocol(format!("non-JSON reply: {e}")))?;

        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(KvError::Protocol(err.to_string()));
        }
        if !status.is_success() {
            return Err(KvError::Transport(format!("HTTP {status}")));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn int_command(&self, cmd: Vec<Value>) -> Result<u64, KvError> {
        match self.command(cmd).await? {
            Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
            other => Err(KvError::Protocol(format!("expected integer, got {other}"))),
        }
    }

    async fn opt_string_command(&self, cmd: Vec<Value>) -> Result<Option<String>, KvError> {
        match self.command(cmd).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(KvError::Protocol(format!("expected string, got {other}"))),
        }
    }

    fn string_array(value: Value) -> Result<Vec<String>, KvError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    other => Err(KvError::Protocol(format!("expected string, got {other}"))),
                })
                .collect(),
            other => Err(KvError::Protocol(format!("expected array, got {other}"))),
        }
    }
}

#[async_trait]
impl KvStore for RestKvClient {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.opt_string_command(vec![json!("GET"), json!(key)]).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.command(vec![json!("SET"), json!(key), json!(value)])
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        self.int_command(vec![json!("DEL"), json!(key)]).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        self.opt_string_command(vec![json!("HGET"), json!(key), json!(field)])
            .await
    }

    async fn hset(&self, key: &str, entries: &[(String, String)]) -> Result<(), KvError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = vec![json!("HSET"), json!(key)];
        for (field, value) in entries {
            cmd.push(json!(field));
            cmd.push(json!(value));
        }
        self.command(cmd).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, KvError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut cmd = vec![json!("HDEL"), json!(key)];
        cmd.extend(fields.iter().map(|f| json!(f)));
        self.int_command(cmd).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        // HGETALL comes back as a flat [field, value, ...] array.
        let flat = Self::string_array(self.command(vec![json!("HGETALL"), json!(key)]).await?)?;
        let mut map = HashMap::with_capacity(flat.len() / 2);
        let mut iter = flat.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }

    async fn lpush(&self, key: &str, values: &[String]) -> Result<u64, KvError> {
        if values.is_empty() {
            return self.llen(key).await;
        }
        let mut cmd = vec![json!("LPUSH"), json!(key)];
        cmd.extend(values.iter().map(|v| json!(v)));
        self.int_command(cmd).await
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), KvError> {
        self.command(vec![json!("LTRIM"), json!(key), json!(start), json!(stop)])
            .await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError> {
        Self::string_array(
            self.command(vec![json!("LRANGE"), json!(key), json!(start), json!(stop)])
                .await?,
        )
    }

    async fn llen(&self, key: &str) -> Result<u64, KvError> {
        self.int_command(vec![json!("LLEN"), json!(key)]).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        Self::string_array(self.command(vec![json!("KEYS"), json!(pattern)]).await?)
    }

    async fn eval(
        &self,
        script: KvScript,
        keys: &[String],
        args: &[String],
    ) -> Result<Value, KvError> {
        let mut cmd = vec![json!("EVAL"), json!(script.lua()), json!(keys.len())];
        cmd.extend(keys.iter().map(|k| json!(k)));
        cmd.extend(args.iter().map(|a| json!(a)));
        self.command(cmd).await
    }
}
