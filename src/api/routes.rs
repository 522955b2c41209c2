//! API route definitions

use super::handlers;
use crate::mcp::server as mcp_server;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Coordination hot path
        // ====================================================================
        .route("/check_status", post(handlers::check_status))
        .route("/post_status", post(handlers::post_status))
        // ====================================================================
        // Graph and activity
        // ====================================================================
        .route("/graph", get(handlers::graph))
        .route("/activity", get(handlers::activity))
        // ====================================================================
        // Administration
        // ====================================================================
        .route("/release_all_locks", post(handlers::release_all_locks))
        .route("/clear_agent_and_feed", post(handlers::clear_agent_and_feed))
        .route("/cleanup_stale_locks", get(handlers::cleanup_stale_locks))
        // ====================================================================
        // Agent protocol (JSON-RPC over SSE)
        // ====================================================================
        .route("/mcp", post(mcp_server::mcp_post).get(mcp_server::mcp_get))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
