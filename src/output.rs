//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for tool calls and CLI commands.
//! Every tool call returns either a `SuccessEnvelope` or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "adapter": "...", "operation": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "adapter": "...", "operation": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};

use crate::error::SwitchboardError;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Adapter that served the call (database, source_hosting, storage)
    pub adapter: String,

    /// Tool name that was executed
    pub operation: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        adapter: impl Into<String>,
        operation: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self { ok: true, adapter: adapter.into(), operation: operation.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Adapter name (empty string if the failure is not adapter-specific)
    pub adapter: String,

    /// Tool name that was attempted
    pub operation: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(adapter: impl Into<String>, operation: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, adapter: adapter.into(), operation: operation.into(), error }
    }

    /// Create error envelope from `SwitchboardError`
    pub fn from_error(
        adapter: impl Into<String>,
        operation: impl Into<String>,
        err: &SwitchboardError,
    ) -> Self {
        Self::new(
            adapter,
            operation,
            ErrorInfo { code: err.error_code().to_string(), message: err.message() },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "UNINITIALIZED", "OPERATION_FAILED")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of items returned (for list-like results, None otherwise)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_returned: Option<usize>,
}

impl Metadata {
    /// Create new metadata with just execution time
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, items_returned: None }
    }

    /// Create metadata for a result value, counting items when it is an array
    pub fn for_value(execution_ms: u64, value: &serde_json::Value) -> Self {
        Self { execution_ms, items_returned: value.as_array().map(Vec::len) }
    }
}
