//! Read-only access to the repository host.
//!
//! Everything the service knows about a repository comes through the
//! [`RepoHost`] trait: the branch HEAD, the recursive tree at a commit,
//! and blob contents. The production implementation talks to the GitHub
//! REST API; tests use [`MockRepoHost`].

pub mod client;
pub mod mock;

use crate::error::RelayError;
use async_trait::async_trait;
use serde::Deserialize;

pub use client::GitHubClient;
pub use mock::MockRepoHost;

/// Owner / repository pair parsed from a normalized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub repo: String,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub entry_type: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }
}

/// Read-only repository host operations.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Current commit sha of `branch`. Cached for a short window.
    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, RelayError>;

    /// Full recursive tree at `commit`.
    async fn recursive_tree(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Vec<TreeEntry>, RelayError>;

    /// Raw content of `path` at `commit`.
    async fn blob_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &str,
    ) -> Result<String, RelayError>;
}

/// Normalize a repository URL to its canonical form.
///
/// Lowercases host and owner/repo, strips a trailing `.git` and trailing
/// slashes. Rejects anything that is not an `http(s)` URL with a host and
/// exactly an `/{owner}/{repo}` path.
pub fn normalize_repo_url(raw: &str) -> Result<String, RelayError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let lower = trimmed.to_lowercase();

    let (scheme, rest) = if lower.starts_with("https://") {
        ("https", &trimmed["https://".len()..])
    } else if lower.starts_with("http://") {
        ("http", &trimmed["http://".len()..])
    } else {
        return Err(RelayError::InvalidRepoUrl(raw.to_string()));
    };

    let mut parts = rest.splitn(2, '/');
    let host = parts.next().unwrap_or_default().to_lowercase();
    let path = parts.next().unwrap_or_default();

    if host.is_empty() || host.contains('@') || host.contains(' ') || !host.contains('.') {
        return Err(RelayError::InvalidRepoUrl(raw.to_string()));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let [owner, repo] = segments.as_slice() else {
        return Err(RelayError::InvalidRepoUrl(raw.to_string()));
    };

    let owner = owner.to_lowercase();
    let repo = repo.to_lowercase().trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return Err(RelayError::InvalidRepoUrl(raw.to_string()));
    }

    Ok(format!("{scheme}://{host}/{owner}/{repo}"))
}

/// Parse `(owner, repo)` out of a repository URL, normalizing first.
pub fn parse_repo_coordinates(url: &str) -> Result<RepoCoordinates, RelayError> {
    let normalized = normalize_repo_url(url)?;
    let mut segments = normalized.rsplit('/');
    let repo = segments.next().unwrap_or_default().to_string();
    let owner = segments.next().unwrap_or_default().to_string();
    Ok(RepoCoordinates { owner, repo })
}
