//! Scripted in-memory repository host for tests.

use super::{RepoHost, TreeEntry};
use crate::error::RelayError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct MockState {
    /// `(owner/repo, branch)` → head sha.
    heads: HashMap<(String, String), String>,
    /// `(owner/repo, commit)` → tree entries.
    trees: HashMap<(String, String), Vec<TreeEntry>>,
    /// `(owner/repo, path, commit)` → content.
    blobs: HashMap<(String, String, String), String>,
    /// When set, every call fails with this error kind.
    failure: Option<MockFailure>,
    head_calls: u64,
}

/// Failure modes a test can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Quota { retry_after_ms: u64 },
    Unreachable,
}

/// In-memory [`RepoHost`] with per-test scripting.
#[derive(Default)]
pub struct MockRepoHost {
    state: Mutex<MockState>,
}

impl MockRepoHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn slug(owner: &str, repo: &str) -> String {
        format!("{owner}/{repo}")
    }

    pub async fn set_head(&self, owner: &str, repo: &str, branch: &str, sha: &str) {
        let mut state = self.state.lock().await;
        state
            .heads
            .insert((Self::slug(owner, repo), branch.to_string()), sha.to_string());
    }

    /// Register a tree at `commit`. Entries are `(path, sha, size)` blobs.
    pub async fn set_tree(&self, owner: &str, repo: &str, commit: &str, files: &[(&str, &str, u64)]) {
        let entries = files
            .iter()
            .map(|(path, sha, size)| TreeEntry {
                path: path.to_string(),
                sha: sha.to_string(),
                size: Some(*size),
                entry_type: "blob".to_string(),
            })
            .collect();
        let mut state = self.state.lock().await;
        state
            .trees
            .insert((Self::slug(owner, repo), commit.to_string()), entries);
    }

    pub async fn set_blob(&self, owner: &str, repo: &str, path: &str, commit: &str, content: &str) {
        let mut state = self.state.lock().await;
        state.blobs.insert(
            (Self::slug(owner, repo), path.to_string(), commit.to_string()),
            content.to_string(),
        );
    }

    pub async fn fail_with(&self, failure: Option<MockFailure>) {
        self.state.lock().await.failure = failure;
    }

    /// How many `branch_head` calls reached the mock (cacheless, so every
    /// coordinator call counts).
    pub async fn head_calls(&self) -> u64 {
        self.state.lock().await.head_calls
    }

    fn check_failure(state: &MockState) -> Result<(), RelayError> {
        match state.failure {
            Some(MockFailure::Quota { retry_after_ms }) => Err(RelayError::QuotaExhausted {
                retry_after_ms: Some(retry_after_ms),
            }),
            Some(MockFailure::Unreachable) => {
                Err(RelayError::Unreachable("mock host offline".to_string()))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RepoHost for MockRepoHost {
    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, RelayError> {
        let mut state = self.state.lock().await;
        state.head_calls += 1;
        Self::check_failure(&state)?;
        state
            .heads
            .get(&(Self::slug(owner, repo), branch.to_string()))
            .cloned()
            .ok_or_else(|| RelayError::BranchNotFound(branch.to_string()))
    }

    async fn recursive_tree(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Vec<TreeEntry>, RelayError> {
        let state = self.state.lock().await;
        Self::check_failure(&state)?;
        state
            .trees
            .get(&(Self::slug(owner, repo), commit.to_string()))
            .cloned()
            .ok_or_else(|| RelayError::Unreachable(format!("no tree scripted for {commit}")))
    }

    async fn blob_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        commit: &str,
    ) -> Result<String, RelayError> {
        let state = self.state.lock().await;
        Self::check_failure(&state)?;
        state
            .blobs
            .get(&(
                Self::slug(owner, repo),
                path.to_string(),
                commit.to_string(),
            ))
            .cloned()
            .ok_or_else(|| RelayError::Unreachable(format!("no blob scripted for {path}@{commit}")))
    }
}
