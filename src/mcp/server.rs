//! JSON-RPC over HTTP with SSE-framed responses.
//!
//! One POST endpoint dispatches `initialize`, `tools/list`, `tools/call`,
//! and `ping`; every non-notification reply is wrapped as an SSE `message`
//! event. `notifications/*` acknowledge with 202 and no body.

use super::handlers::ToolHandler;
use super::protocol::*;
use super::tools::all_tools;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "relay";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET handshake: an empty SSE comment frame.
pub async fn mcp_get() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        ": relay\n\n".to_string(),
    )
}

/// POST dispatch for all JSON-RPC methods.
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    // Agent clients must accept both reply framings.
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !accept.contains("application/json") || !accept.contains("text/event-stream") {
        let error = JsonRpcResponse::error(
            Value::Null,
            JsonRpcError::invalid_request(
                "Accept header must include application/json and text/event-stream",
            ),
        );
        return (StatusCode::NOT_ACCEPTABLE, Json(error)).into_response();
    }

    let Ok(Json(raw)) = body else {
        return sse_frame(JsonRpcResponse::error(
            Value::Null,
            JsonRpcError::parse_error("request body is not JSON"),
        ));
    };

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return sse_frame(JsonRpcResponse::error(
                Value::Null,
                JsonRpcError::parse_error(e.to_string()),
            ));
        }
    };

    if request.method.starts_with("notifications/") {
        debug!(method = %request.method, "notification acknowledged");
        return StatusCode::ACCEPTED.into_response();
    }

    let id = request.id.clone().unwrap_or(Value::Null);
    let response = match dispatch(&state, &request).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::error(id, error),
    };
    sse_frame(response)
}

async fn dispatch(state: &AppState, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    match request.method.as_str() {
        "initialize" => handle_initialize(request),
        "ping" => Ok(json!({})),
        "tools/list" => {
            let result = ToolsListResult { tools: all_tools() };
            serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
        }
        "tools/call" => handle_tools_call(state, request).await,
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn handle_initialize(request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    let client_protocol = request
        .params
        .as_ref()
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(client_protocol, "agent client initializing");

    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        },
    };
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

async fn handle_tools_call(
    state: &AppState,
    request: &JsonRpcRequest,
) -> Result<Value, JsonRpcError> {
    let params: ToolCallParams = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params("params required"))
        .and_then(|p| {
            serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
        })?;

    info!(tool = %params.name, "tool call");
    debug!(arguments = ?params.arguments, "tool call arguments");

    let handler = ToolHandler::new(state.clone());
    let result = handler.handle(&params.name, params.arguments).await;
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Wrap one JSON-RPC reply as an SSE `message` event.
fn sse_frame(response: JsonRpcResponse) -> Response {
    let payload = serde_json::to_string(&response).unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        format!("event: message\ndata: {payload}\n\n"),
    )
        .into_response()
}
