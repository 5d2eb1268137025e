//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Switchboard.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Uninitialized`: Adapter operation invoked before a successful `initialize()`
//! - `OperationFailed`: Underlying service call failed (carries the operation name)
//! - `InvalidInput`: Malformed tool arguments or missing required parameters
//! - `ConfigError`: Configuration file errors
//! - `CredentialSource`: A credential source could not produce a value
//! - `CommandFailed`: An external CLI invocation failed
//!
//! Credential resolution never surfaces these errors to its callers; the
//! resolver turns them into "absent" outcomes. Adapters surface them as-is.

use thiserror::Error;

/// Main error type for Switchboard operations
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// Adapter operation attempted before the client was constructed
    #[error("{adapter} client is not initialized (operation: {operation})")]
    Uninitialized { adapter: String, operation: String },

    /// Underlying service call failed
    #[error("{operation} failed: {detail}")]
    OperationFailed { operation: String, detail: String },

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A credential source could not produce a value
    #[error("Credential source {source_name} unavailable: {detail}")]
    CredentialSource { source_name: String, detail: String },

    /// External command failed to run or exited non-zero
    #[error("Command '{program}' failed: {detail}")]
    CommandFailed { program: String, detail: String },
}

impl SwitchboardError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Uninitialized { .. } => "UNINITIALIZED",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::CredentialSource { .. } => "CREDENTIAL_SOURCE",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
        }
    }

    /// Get human-readable error message
    ///
    /// Secret values are never interpolated into error variants, so this is
    /// safe to include in tool output.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create an uninitialized-client error
    pub fn uninitialized(adapter: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Uninitialized { adapter: adapter.into(), operation: operation.into() }
    }

    /// Create an operation failure carrying the operation name and underlying cause
    pub fn operation_failed(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::OperationFailed { operation: operation.into(), detail: detail.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a credential source error
    pub fn credential_source(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CredentialSource { source_name: source_name.into(), detail: detail.into() }
    }

    /// Create a command failure error
    pub fn command_failed(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CommandFailed { program: program.into(), detail: detail.into() }
    }

    /// Name of the operation this error belongs to, if it carries one
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Uninitialized { operation, .. } | Self::OperationFailed { operation, .. } => {
                Some(operation)
            }
            _ => None,
        }
    }
}

/// Result type alias for Switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;
