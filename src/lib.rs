//! Switchboard - Credential-Resolving Tool Server
//!
//! Switchboard exposes a database REST endpoint, a source-hosting API and cloud
//! object storage as MCP tools for an external tool-calling host. Credentials
//! are resolved once at startup from a managed secret store, the local cloud
//! CLI and process environment variables.
//!
//! # Architecture
//! The resolver runs first and is then shared read-only. Each adapter builds
//! its client from the resolved snapshot; adapters whose credentials are
//! missing stay uninitialized and fail their tool calls with `UNINITIALIZED`.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`config`] - Configuration management
//! - [`process`] - External command execution
//! - [`secrets`] - Credential sources and the resolver
//! - [`adapters`] - Service adapters and tool descriptors
//! - [`workspace`] - Repository cloning
//! - [`mcp`] - MCP server
//! - [`logging`] - Tracing subscriber setup

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod output;
pub mod process;
pub mod secrets;
pub mod workspace;

// Re-export commonly used types for convenience
pub use adapters::{build_adapters, ToolAdapter, ToolDescriptor};
pub use config::{ConfigLocation, RepositoryEntry, Settings};
pub use error::{Result, SwitchboardError};
pub use mcp::ToolServer;
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use secrets::{CredentialSnapshot, CredentialStatus, SecretsResolver};
pub use workspace::{CloneReport, GitCredentials};
