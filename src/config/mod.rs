//! Configuration Management
//!
//! This module loads runtime settings for the CLI probe, HTTP clients, service
//! endpoints and the repository clone list. Credentials are never stored here;
//! they come from the secrets resolver.
//!
//! # Configuration Locations
//! - Local: `.switchboard/config.json` (team-shareable, per-project)
//! - Global: `~/.config/switchboard/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local config file (highest priority)
//! 2. Global config file
//! 3. Built-in defaults
//!
//! Files are merged key by key, so a local file only needs the fields it overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SwitchboardError};

/// Top-level runtime settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ambient cloud CLI used by the credential probe
    pub cli: CliSettings,

    /// Shared HTTP client settings
    pub http: HttpSettings,

    /// Managed secret store endpoint
    pub secret_store: SecretStoreSettings,

    /// Database REST endpoint layout
    pub database: DatabaseSettings,

    /// Source-hosting REST API
    pub source_hosting: SourceHostingSettings,

    /// Object storage JSON API
    pub storage: StorageSettings,

    /// Repositories handled by the `clone` command
    pub repositories: RepositorySettings,
}

/// Ambient cloud CLI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    /// CLI program name or path
    pub program: String,

    /// Timeout for each CLI invocation in milliseconds
    pub timeout_ms: u64,

    /// Arguments that print an application-default bearer token
    pub token_args: Vec<String>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            program: "gcloud".to_string(),
            timeout_ms: 10_000,
            token_args: vec![
                "auth".to_string(),
                "application-default".to_string(),
                "print-access-token".to_string(),
            ],
        }
    }
}

/// HTTP client settings shared by all adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// User-Agent header sent on every request
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("switchboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Managed secret store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretStoreSettings {
    /// Base URL of the secret store API
    pub base_url: String,
}

impl Default for SecretStoreSettings {
    fn default() -> Self {
        Self { base_url: "https://secretmanager.googleapis.com".to_string() }
    }
}

/// Database REST endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path appended to the resolved endpoint URL
    pub rest_path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { rest_path: "/rest/v1".to_string() }
    }
}

/// Source-hosting API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceHostingSettings {
    /// Base URL of the REST API
    pub api_base_url: String,
}

impl Default for SourceHostingSettings {
    fn default() -> Self {
        Self { api_base_url: "https://api.github.com".to_string() }
    }
}

/// Object storage API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base URL of the JSON API (both `/storage/v1` and `/upload/storage/v1` hang off it)
    pub api_base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { api_base_url: "https://storage.googleapis.com".to_string() }
    }
}

/// Repository clone list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Host the temporary credential helper is scoped to
    pub host: String,

    /// Timeout for each `git` invocation in milliseconds
    pub timeout_ms: u64,

    /// Repositories to clone, in order
    pub entries: Vec<RepositoryEntry>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self { host: "github.com".to_string(), timeout_ms: 600_000, entries: Vec::new() }
    }
}

/// A single repository to clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Directory name under the clone target
    pub name: String,

    /// Clone URL
    pub url: String,
}

impl RepositoryEntry {
    /// Create a new repository entry
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.switchboard/config.json`
    Local,
    /// Global config: `~/.config/switchboard/config.json`
    Global,
}

/// Get path to local config file (`.switchboard/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        SwitchboardError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".switchboard").join("config.json"))
}

/// Get path to global config file (`~/.config/switchboard/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        SwitchboardError::config_error("Could not determine user config directory")
    })?;

    Ok(config_dir.join("switchboard").join("config.json"))
}

/// Get the path for a config location
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Read a config file as a raw JSON value
///
/// A missing file yields `None`; an unreadable or malformed file is an error.
pub fn read_config_value(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| SwitchboardError::config_error(format!("Could not read config file: {e}")))?;

    let value = serde_json::from_str::<Value>(&contents).map_err(|e| {
        SwitchboardError::config_error(format!(
            "Invalid config file format in {}: {e}",
            path.display()
        ))
    })?;

    if !value.is_object() {
        return Err(SwitchboardError::config_error(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }

    Ok(Some(value))
}

/// Deep-merge `overlay` into `base`
///
/// Objects merge key by key; any other value in `overlay` replaces the one in `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Build settings from defaults plus the given overlays, lowest precedence first
pub fn settings_from_layers(layers: Vec<Value>) -> Result<Settings> {
    let mut merged = serde_json::to_value(Settings::default())
        .map_err(|e| SwitchboardError::config_error(format!("Could not serialize defaults: {e}")))?;

    for layer in layers {
        merge_values(&mut merged, layer);
    }

    serde_json::from_value(merged)
        .map_err(|e| SwitchboardError::config_error(format!("Invalid configuration: {e}")))
}

/// Load settings with precedence (local over global over defaults)
pub fn load_with_precedence() -> Result<Settings> {
    let global_path = global_config_path()?;
    let local_path = local_config_path()?;

    let mut layers = Vec::new();
    if let Some(global) = read_config_value(&global_path)? {
        layers.push(global);
    }
    if let Some(local) = read_config_value(&local_path)? {
        layers.push(local);
    }

    settings_from_layers(layers)
}

/// Load settings from one explicit file over the defaults
pub fn load_from_file(path: &Path) -> Result<Settings> {
    let value = read_config_value(path)?.ok_or_else(|| {
        SwitchboardError::config_error(format!("Config file {} not found", path.display()))
    })?;

    settings_from_layers(vec![value])
}

/// Save settings to a config file, creating the parent directory if needed
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SwitchboardError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| SwitchboardError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| SwitchboardError::config_error(format!("Could not write config file: {e}")))?;

    Ok(())
}
