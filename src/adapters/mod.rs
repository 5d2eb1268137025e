//! Service Adapters
//!
//! Each adapter wraps one external service behind the same contract:
//! - `new` stores the resolver reference and settings only
//! - `initialize` builds the client from resolved credentials, or returns `false`
//! - operations fail with `Uninitialized` until `initialize` has succeeded
//! - `tools` lists the adapter's tool descriptors for discovery
//!
//! # Engine Isolation
//! Adapters share nothing but the resolver and the helpers in this module.
//! Each one is behind its own cargo feature.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::error::{Result, SwitchboardError};
use crate::secrets::SecretsResolver;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "source-hosting")]
pub mod source_hosting;

#[cfg(feature = "object-storage")]
pub mod storage;

/// Declarative description of one callable tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Stable tool name (external contract)
    pub name: &'static str,

    /// Human-readable description
    pub description: &'static str,

    /// JSON schema of the tool arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Describe a tool whose arguments deserialize into `T`
    #[must_use]
    pub fn new<T: JsonSchema>(name: &'static str, description: &'static str) -> Self {
        Self { name, description, input_schema: input_schema_for::<T>() }
    }
}

/// Generate an inline JSON schema (no `$ref`s, no meta-schema) for `T`
#[must_use]
pub fn input_schema_for<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// Deserialize tool arguments, reporting the tool name on failure
pub fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    // Hosts may send no arguments at all for tools without required fields
    let arguments = if arguments.is_null() { Value::Object(serde_json::Map::new()) } else { arguments };

    serde_json::from_value(arguments)
        .map_err(|e| SwitchboardError::invalid_input(format!("Invalid arguments for {tool}: {e}")))
}

/// Check an HTTP response and decode its JSON body
///
/// Transport errors and non-success statuses become `OperationFailed` with the
/// operation name; an empty body decodes to `null`.
pub(crate) async fn read_json(
    operation: &str,
    response: reqwest::Result<reqwest::Response>,
) -> Result<Value> {
    let text = read_text(operation, response).await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| {
        SwitchboardError::operation_failed(operation, format!("invalid JSON response: {e}"))
    })
}

/// Check an HTTP response and return its body as bytes
pub(crate) async fn read_bytes(
    operation: &str,
    response: reqwest::Result<reqwest::Response>,
) -> Result<Vec<u8>> {
    let response = check_status(operation, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SwitchboardError::operation_failed(operation, e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Binary body as `{ encoding, content }`: text when valid UTF-8, base64 otherwise
#[must_use]
pub fn media_content(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => json!({ "encoding": "utf-8", "content": text }),
        Err(e) => json!({ "encoding": "base64", "content": STANDARD.encode(e.into_bytes()) }),
    }
}

async fn read_text(
    operation: &str,
    response: reqwest::Result<reqwest::Response>,
) -> Result<String> {
    let response = check_status(operation, response).await?;
    response.text().await.map_err(|e| SwitchboardError::operation_failed(operation, e.to_string()))
}

async fn check_status(
    operation: &str,
    response: reqwest::Result<reqwest::Response>,
) -> Result<reqwest::Response> {
    let response =
        response.map_err(|e| SwitchboardError::operation_failed(operation, e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SwitchboardError::operation_failed(operation, format!("HTTP {}: {body}", status.as_u16())))
}

/// Common adapter contract used by the MCP server
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Adapter name used in envelopes and logs
    fn name(&self) -> &'static str;

    /// Build the client from resolved credentials; `false` if they are absent
    fn initialize(&mut self) -> bool;

    /// Whether a client handle exists
    fn is_available(&self) -> bool;

    /// Tool catalogue for this adapter
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Whether `tool` belongs to this adapter
    fn handles(&self, tool: &str) -> bool {
        self.tools().iter().any(|descriptor| descriptor.name == tool)
    }

    /// Invoke `tool` with raw JSON arguments
    async fn call(&self, tool: &str, arguments: Value) -> Result<Value>;
}

/// Tool catalogue of every compiled-in adapter, without credentials
#[must_use]
pub fn catalogue() -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();

    #[cfg(feature = "database")]
    tools.extend(database::DatabaseAdapter::catalogue());

    #[cfg(feature = "source-hosting")]
    tools.extend(source_hosting::SourceHostingAdapter::catalogue());

    #[cfg(feature = "object-storage")]
    tools.extend(storage::StorageAdapter::catalogue());

    tools
}

/// Construct every compiled-in adapter and try to initialize it
pub fn build_adapters(
    resolver: &Arc<SecretsResolver>,
    settings: &Settings,
) -> Vec<Box<dyn ToolAdapter>> {
    let mut adapters: Vec<Box<dyn ToolAdapter>> = Vec::new();

    #[cfg(feature = "database")]
    adapters.push(Box::new(database::DatabaseAdapter::new(Arc::clone(resolver), settings)));

    #[cfg(feature = "source-hosting")]
    adapters.push(Box::new(source_hosting::SourceHostingAdapter::new(
        Arc::clone(resolver),
        settings,
    )));

    #[cfg(feature = "object-storage")]
    adapters.push(Box::new(storage::StorageAdapter::new(Arc::clone(resolver), settings)));

    for adapter in &mut adapters {
        let available = adapter.initialize();
        info!(adapter = adapter.name(), available, "adapter initialized");
    }

    // Keeps the signature stable when every adapter feature is disabled
    let _ = (resolver, settings);

    adapters
}
