//! GitHub REST API client.
//!
//! Surfaces quota exhaustion distinctly (with a retry hint derived from the
//! rate-limit headers) and keeps a short in-process HEAD cache so the hot
//! path does not hit the API on every request.

use super::{RepoHost, TreeEntry};
use crate::error::RelayError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const API_BASE: &str = "https://api.github.com";
const HEAD_CACHE_TTL: Duration = Duration::from_secs(30);
/// Agent-facing calls must answer quickly.
const HEAD_TIMEOUT: Duration = Duration::from_secs(5);
/// Tree and blob reads only happen inside graph builds.
const BUILD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// GitHub REST v3 client.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    head_cache: Mutex<HashMap<String, (String, Instant)>>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self, RelayError> {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("relay/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Internal(anyhow::anyhow!(e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            head_cache: Mutex::new(HashMap::new()),
        })
    }

    fn request(&self, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .timeout(timeout)
            .header("accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Map a non-success response to the matching error kind.
    fn classify(resp: &reqwest::Response, branch: Option<&str>) -> RelayError {
        let status = resp.status();
        let remaining = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok());

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || (status == reqwest::StatusCode::FORBIDDEN && remaining == Some("0"))
        {
            return RelayError::QuotaExhausted {
                retry_after_ms: retry_after_ms(resp),
            };
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(branch) = branch {
                return RelayError::BranchNotFound(branch.to_string());
            }
        }
        RelayError::Unreachable(format!("GitHub API returned {status}"))
    }
}

/// Derive a retry hint from `retry-after` (seconds) or `x-ratelimit-reset`
/// (epoch seconds).
fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(secs * 1000);
    }
    let reset = header("x-ratelimit-reset")?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some(reset.saturating_sub(now) * 1000)
}

fn transport_error(e: reqwest::Error) -> RelayError {
    if e.is_timeout() {
        RelayError::Unreachable("GitHub API request timed out".to_string())
    } else {
        RelayError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, RelayError> {
        let cache_key = format!("{owner}/{repo}#{branch}");
        {
            let cache = self.head_cache.lock().await;
            if let Some((sha, at)) = cache.get(&cache_key) {
                if at.elapsed() < HEAD_CACHE_TTL {
                    return Ok(sha.clone());
                }
            }
        }

        let url = format!("{}/repos/{owner}/{repo}/branches/{branch}", self.base_url);
        let resp = self
            .request(&url, HEAD_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify(&resp, Some(branch)));
        }

        let body: BranchResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;

        let mut cache = self.head_cache.lock().await;
        cache.insert(cache_key, (body.commit.sha.clone(), Instant::now()));
        Ok(body.commit.sha)
    }

    async fn recursive_tree(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Vec<TreeEntry>, RelayError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{commit}?recursive=1",
            self.base_url
        );
        let resp = self
            .request(&url, BUILD_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify(&resp, None));
        }

        let body: TreeResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;
        if body.truncated {
            tracing::warn!(%owner, %repo, %commit, "recursive tree truncated by GitHub");
        }
        Ok(body.tree)
    }

    async fn blob_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &str,
    ) -> Result<String, RelayError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{path}?ref={commit}",
            self.base_url
        );
        let mut req = self
            .client
            .get(&url)
            .timeout(BUILD_TIMEOUT)
            .header("accept", "application/vnd.github.raw");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::classify(&resp, None));
        }
        resp.text()
            .await
            .map_err(|e| RelayError::Unreachable(e.to_string()))
    }
}
