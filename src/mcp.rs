//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dependencies**: Only `serde_json` and anyhow (no MCP-specific crates)
//! - **Routing**: each `tools/call` goes to the adapter that lists the tool
//!
//! # Results
//!
//! Adapter results are wrapped in a `SuccessEnvelope`; adapter errors become an
//! `ErrorEnvelope` in a tool result with `isError: true`. Protocol problems
//! (unknown method, unknown tool, malformed params) are JSON-RPC errors.
//!
//! # Usage
//!
//! Start the MCP server with: `switchboard serve`
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "switchboard": {
//!       "command": "switchboard",
//!       "args": ["serve"]
//!     }
//!   }
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::adapters::{ToolAdapter, ToolDescriptor};
use crate::output::{ErrorEnvelope, Metadata, SuccessEnvelope};

const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl TextContent {
    fn new(text: String) -> Self {
        Self { content_type: "text".to_string(), text }
    }
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    /// Tool result carrying `data` as pretty JSON text
    fn from_data(data: impl Serialize, is_error: bool) -> Result<Value> {
        let json_text = serde_json::to_string_pretty(&data)?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error };
        Ok(serde_json::to_value(result)?)
    }
}

// ============================================================================
// MCP Server
// ============================================================================

/// Tool server over a fixed set of adapters
pub struct ToolServer {
    adapters: Vec<Box<dyn ToolAdapter>>,
}

impl ToolServer {
    /// Create a server; adapters are expected to be initialized already
    #[must_use]
    pub fn new(adapters: Vec<Box<dyn ToolAdapter>>) -> Self {
        Self { adapters }
    }

    /// Every tool of every adapter, in adapter order
    #[must_use]
    pub fn catalogue(&self) -> Vec<ToolDescriptor> {
        self.adapters.iter().flat_map(|adapter| adapter.tools()).collect()
    }

    /// Names of the adapters holding a client handle
    #[must_use]
    pub fn available_adapters(&self) -> Vec<&'static str> {
        self.adapters.iter().filter(|a| a.is_available()).map(|a| a.name()).collect()
    }

    /// Serve on process stdin/stdout until stdin closes
    ///
    /// # Errors
    ///
    /// Returns an error if stdio communication fails.
    pub async fn serve(&self) -> Result<()> {
        info!(adapters = ?self.available_adapters(), "MCP server listening on stdio");
        self.serve_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC from `reader`, writing responses to `writer`
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve_io<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let response_json = serde_json::to_string(&response)?;
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one line; `None` for notifications, which get no response
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return Some(JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"))),
        };

        if request.id.is_none() && request.method.starts_with("notifications/") {
            debug!(method = %request.method, "notification received");
            return None;
        }

        Some(self.handle_request(request).await)
    }

    /// Route a request to its handler
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => Ok(handle_initialize()),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Unknown method: {}", request.method),
                )
            }
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
        }
    }

    fn handle_list_tools(&self) -> Result<Value> {
        Ok(serde_json::json!({ "tools": self.catalogue() }))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.handles(name))
            .ok_or_else(|| anyhow!("Unknown tool: {name}"))?;

        let start = Instant::now();
        let outcome = adapter.call(name, arguments).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(data) => {
                debug!(tool = name, elapsed_ms, "tool call succeeded");
                let meta = Metadata::for_value(elapsed_ms, &data);
                CallToolResult::from_data(SuccessEnvelope::new(adapter.name(), name, data, meta), false)
            }
            Err(e) => {
                debug!(tool = name, code = e.error_code(), "tool call failed");
                CallToolResult::from_data(ErrorEnvelope::from_error(adapter.name(), name, &e), true)
            }
        }
    }
}

/// Handle MCP initialize request
fn handle_initialize() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "switchboard",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
