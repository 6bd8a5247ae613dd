//! Tool execution boundary
//!
//! The tool server runs as a separate process and speaks line-delimited
//! JSON-RPC over stdio. Everything above this module talks to it through
//! the `ToolTransport` trait.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod stdio;
pub use stdio::StdioToolClient;

/// Protocol version sent in the initialize handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A tool as reported by the server's listing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Output of one tool invocation that reached the server
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutput {
    pub text: String,
    /// Server-side error flag; the call itself succeeded at the transport level
    pub is_error: bool,
}

/// Seam between the routing engine and the tool server
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutput>;
}

//
// ================= Wire types =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListToolsResult {
    pub tools: Vec<RemoteTool>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ContentItem {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl CallToolResult {
    pub fn into_output(self) -> ToolCallOutput {
        let text = self
            .content
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text),
                ContentItem::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        ToolCallOutput {
            text,
            is_error: self.is_error.unwrap_or(false),
        }
    }
}
