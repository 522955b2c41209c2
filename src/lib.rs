//! Relay
//!
//! A coordination service for multiple concurrent editors (AI agents and
//! humans) working on the same repository. On every request it answers:
//! is the caller's working tree current relative to the remote branch, and
//! is any file they intend to edit, or adjacent to it in the import
//! graph, claimed by someone else. Verdicts come back as a single
//! orchestration command.

pub mod activity;
pub mod api;
pub mod coordinator;
pub mod error;
pub mod github;
pub mod graph;
pub mod identity;
pub mod kv;
pub mod locks;
pub mod mcp;
pub mod orchestration;

use anyhow::{Context, Result};
use coordinator::Coordinator;
use std::sync::Arc;

// ============================================================================
// Namespace
// ============================================================================

/// Coordination namespace: normalized repo URL + branch. All lock, graph,
/// and activity state lives under keys derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub repo_url: String,
    pub branch: String,
}

impl Namespace {
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
        }
    }

    pub fn locks_key(&self) -> String {
        format!("locks:{}:{}", self.repo_url, self.branch)
    }

    pub fn graph_key(&self) -> String {
        format!("graph:{}:{}", self.repo_url, self.branch)
    }

    pub fn graph_meta_key(&self) -> String {
        format!("graph:meta:{}:{}", self.repo_url, self.branch)
    }

    pub fn file_shas_key(&self) -> String {
        format!("graph:file_shas:{}:{}", self.repo_url, self.branch)
    }

    pub fn activity_key(&self) -> String {
        format!("activity:{}:{}", self.repo_url, self.branch)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo_url, self.branch)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration, environment-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub kv_url: String,
    pub kv_token: String,
    pub cron_secret: String,
    /// Optional GitHub token; raises the API quota.
    pub remote_host_token: Option<String>,
    /// Reject anonymous writes when set.
    pub strict_identity: bool,
    /// Deployment-chosen repo URL rewrite for the agent adapter.
    pub canonical_repo_url: Option<String>,
    pub server_port: u16,
}

impl Config {
    /// Load from environment variables. Missing required values abort
    /// startup.
    pub fn from_env() -> Result<Self> {
        let required =
            |name: &str| std::env::var(name).with_context(|| format!("{name} must be set"));
        let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Ok(Self {
            kv_url: required("KV_URL")?,
            kv_token: required("KV_TOKEN")?,
            cron_secret: required("CRON_SECRET")?,
            remote_host_token: optional("REMOTE_HOST_TOKEN"),
            strict_identity: optional("STRICT_IDENTITY")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            canonical_repo_url: optional("CANONICAL_REPO_URL"),
            server_port: optional("SERVER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        })
    }
}

// ============================================================================
// Shared application state
// ============================================================================

/// Shared state handed to both request planes.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Production wiring: REST KV client + GitHub client.
    pub fn new(config: Config) -> Result<Self> {
        let kv: Arc<dyn kv::KvStore> = Arc::new(
            kv::RestKvClient::new(&config.kv_url, &config.kv_token)
                .map_err(|e| anyhow::anyhow!(e))?,
        );
        let host: Arc<dyn github::RepoHost> = Arc::new(
            github::GitHubClient::new(config.remote_host_token.clone())
                .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        );
        Ok(Self::with_stores(config, kv, host))
    }

    /// Wiring with explicit stores; tests inject the in-memory KV store
    /// and the scripted repo host here.
    pub fn with_stores(
        config: Config,
        kv: Arc<dyn kv::KvStore>,
        host: Arc<dyn github::RepoHost>,
    ) -> Self {
        let locks = Arc::new(locks::LockRegistry::new(kv.clone()));
        let extractor: Arc<dyn graph::ImportExtractor> =
            Arc::new(graph::RegexImportExtractor::new());
        let graphs = Arc::new(graph::GraphService::new(
            kv.clone(),
            host.clone(),
            locks.clone(),
            extractor,
        ));
        let coordinator = Arc::new(Coordinator::new(
            host,
            kv,
            locks,
            graphs,
            config.strict_identity,
        ));
        Self {
            coordinator,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Server entry point
// ============================================================================

/// Start the HTTP server and run until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let port = config.server_port;
    let state = AppState::new(config)?;
    let app = api::routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!("relay listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod namespace_tests {
    use super::*;

    #[test]
    fn key_layout() {
        let ns = Namespace::new("https://github.com/acme/widgets", "main");
        assert_eq!(ns.locks_key(), "locks:https://github.com/acme/widgets:main");
        assert_eq!(ns.graph_key(), "graph:https://github.com/acme/widgets:main");
        assert_eq!(
            ns.graph_meta_key(),
            "graph:meta:https://github.com/acme/widgets:main"
        );
        assert_eq!(
            ns.file_shas_key(),
            "graph:file_shas:https://github.com/acme/widgets:main"
        );
        assert_eq!(
            ns.activity_key(),
            "activity:https://github.com/acme/widgets:main"
        );
    }
}
