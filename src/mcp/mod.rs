//! MCP (Model Context Protocol) bridge.
//!
//! Exposes `check_status` and `post_status` as agent tools over a single
//! JSON-RPC endpoint with SSE-framed responses.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::*;
