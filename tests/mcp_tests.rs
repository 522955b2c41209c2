//! Agent protocol (JSON-RPC over SSE) integration tests

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use relay::api::routes::create_router;
use relay::github::{mock::MockFailure, MockRepoHost, RepoHost};
use relay::kv::{KvStore, MemoryKvStore};
use relay::{AppState, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const REPO: &str = "https://github.com/acme/widgets";

fn test_config() -> Config {
    Config {
        kv_url: "http://unused.invalid".to_string(),
        kv_token: "unused".to_string(),
        cron_secret: "secret".to_string(),
        remote_host_token: None,
        strict_identity: false,
        canonical_repo_url: None,
        server_port: 0,
    }
}

async fn setup() -> (Router, Arc<MockRepoHost>) {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let host = Arc::new(MockRepoHost::new());
    let host_dyn: Arc<dyn RepoHost> = host.clone();
    let state = AppState::with_stores(test_config(), kv, host_dyn);
    (create_router(state), host)
}

/// POST a JSON-RPC message with the full Accept pair and return the raw
/// response.
async fn rpc_raw(router: &Router, accept: &str, body: Value) -> (StatusCode, String) {
    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, accept)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// POST a JSON-RPC message and decode the SSE-framed reply.
async fn rpc(router: &Router, body: Value) -> Value {
    let (status, text) = rpc_raw(router, "application/json, text/event-stream", body).await;
    assert_eq!(status, StatusCode::OK);
    let data = text
        .strip_prefix("event: message\ndata: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap_or_else(|| panic!("not an SSE message frame: {text:?}"));
    serde_json::from_str(data).unwrap()
}

#[tokio::test]
async fn get_handshake_returns_comment_frame() {
    let (router, _) = setup().await;
    let resp = router
        .oneshot(Request::builder().uri("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b":"));
}

#[tokio::test]
async fn missing_accept_pair_is_rejected_with_406() {
    let (router, _) = setup().await;
    let (status, text) = rpc_raw(
        &router,
        "application/json",
        json!({"jsonrpc": "2.0", "method": "ping", "id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn initialize_reports_fixed_protocol_version() {
    let (router, _) = setup().await;
    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-agent", "version": "1.0"}
            },
            "id": 1
        }),
    )
    .await;
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["serverInfo"]["name"], "relay");
    assert_eq!(reply["id"], 1);
}

#[tokio::test]
async fn tools_list_exposes_both_tools() {
    let (router, _) = setup().await;
    let reply = rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "tools/list", "id": 2}),
    )
    .await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["check_status", "post_status"]);
    assert!(tools[0]["inputSchema"]["properties"]["username"].is_object());
}

#[tokio::test]
async fn ping_returns_empty_result() {
    let (router, _) = setup().await;
    let reply = rpc(&router, json!({"jsonrpc": "2.0", "method": "ping", "id": 7})).await;
    assert_eq!(reply["result"], json!({}));
}

#[tokio::test]
async fn notifications_are_acknowledged_without_body() {
    let (router, _) = setup().await;
    let (status, text) = rpc_raw(
        &router,
        "application/json, text/event-stream",
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(text.is_empty());
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let (router, _) = setup().await;
    let reply = rpc(
        &router,
        json!({"jsonrpc": "2.0", "method": "resources/list", "id": 3}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn omitted_branch_falls_back_from_master_to_main() {
    let (router, host) = setup().await;
    // Only "main" exists; the adapter's first try ("master") fails with a
    // branch-not-found signal and is retried exactly once.
    host.set_head("acme", "widgets", "main", "HEAD-1").await;

    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "check_status",
                "arguments": {
                    "username": "alice",
                    "file_paths": ["src/a.ts"],
                    "agent_head": "HEAD-1",
                    "repo_url": REPO,
                }
            },
            "id": 4
        }),
    )
    .await;

    let content = &reply["result"]["structuredContent"];
    assert_eq!(content["status"], "OK");
    assert_eq!(content["repo_head"], "HEAD-1");
    assert_eq!(content["orchestration"]["action"], "PROCEED");
}

#[tokio::test]
async fn explicit_branch_is_not_retried() {
    let (router, host) = setup().await;
    host.set_head("acme", "widgets", "main", "HEAD-1").await;

    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "check_status",
                "arguments": {
                    "username": "alice",
                    "file_paths": ["src/a.ts"],
                    "agent_head": "HEAD-1",
                    "repo_url": REPO,
                    "branch": "develop",
                }
            },
            "id": 5
        }),
    )
    .await;

    // No fallback: the branch-not-found signal surfaces as an offline
    // envelope.
    let content = &reply["result"]["structuredContent"];
    assert_eq!(content["status"], "OFFLINE");
    assert_eq!(content["orchestration"]["action"], "STOP");
}

#[tokio::test]
async fn rate_limit_maps_to_offline_stop_envelope() {
    let (router, host) = setup().await;
    host.set_head("acme", "widgets", "main", "HEAD-1").await;
    host.fail_with(Some(MockFailure::Quota {
        retry_after_ms: 2500,
    }))
    .await;

    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "check_status",
                "arguments": {
                    "username": "alice",
                    "file_paths": ["src/a.ts"],
                    "agent_head": "HEAD-1",
                    "repo_url": REPO,
                    "branch": "main",
                }
            },
            "id": 6
        }),
    )
    .await;

    let content = &reply["result"]["structuredContent"];
    assert_eq!(content["status"], "OFFLINE");
    assert_eq!(content["repo_head"], "unknown");
    assert_eq!(content["orchestration"]["action"], "STOP");
    assert!(content["orchestration"]["reason"]
        .as_str()
        .unwrap()
        .contains("2500"));
    assert!(content["warnings"][0].as_str().unwrap().contains("RATE_LIMITED"));
}

#[tokio::test]
async fn post_status_tool_round_trip() {
    let (router, host) = setup().await;
    host.set_head("acme", "widgets", "main", "HEAD-1").await;

    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "post_status",
                "arguments": {
                    "username": "alice",
                    "file_paths": ["src/a.ts"],
                    "status": "WRITING",
                    "message": "refactoring auth",
                    "agent_head": "HEAD-1",
                    "repo_url": REPO,
                    "branch": "main",
                }
            },
            "id": 8
        }),
    )
    .await;

    let content = &reply["result"]["structuredContent"];
    assert_eq!(content["success"], true);
    assert_eq!(content["orchestration"]["action"], "PROCEED");
    assert_eq!(content["locks"][0]["file_path"], "src/a.ts");
    // The text block carries the same payload.
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["success"], true);
}

#[tokio::test]
async fn post_status_network_failure_stops() {
    let (router, host) = setup().await;
    host.set_head("acme", "widgets", "main", "HEAD-1").await;
    host.fail_with(Some(MockFailure::Unreachable)).await;

    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "post_status",
                "arguments": {
                    "username": "alice",
                    "file_paths": ["src/a.ts"],
                    "status": "WRITING",
                    "message": "m",
                    "agent_head": "HEAD-1",
                    "repo_url": REPO,
                    "branch": "main",
                }
            },
            "id": 9
        }),
    )
    .await;

    let content = &reply["result"]["structuredContent"];
    assert_eq!(content["success"], false);
    assert_eq!(content["orchestration"]["action"], "STOP");
}

#[tokio::test]
async fn unknown_tool_is_a_tool_level_error() {
    let (router, _) = setup().await;
    let reply = rpc(
        &router,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {"name": "delete_everything", "arguments": {}},
            "id": 10
        }),
    )
    .await;
    assert_eq!(reply["result"]["isError"], true);
}
