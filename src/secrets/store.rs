//! Managed Secret Store Client
//!
//! Fetches the latest version of named secrets for a project:
//! `GET {base}/v1/projects/{project}/secrets/{secret}/versions/latest:access`
//! with a bearer token, decoding the base64 `payload.data` field as UTF-8 text.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::probe::CloudCliProbe;
use super::SourceOutcome;
use crate::config::{HttpSettings, SecretStoreSettings};
use crate::error::{Result, SwitchboardError};

/// Fully-qualified name of the latest version of a secret
#[must_use]
pub fn secret_version_name(project_id: &str, secret_name: &str) -> String {
    format!("projects/{project_id}/secrets/{secret_name}/versions/latest")
}

/// A store of versioned named secrets scoped to one project
#[async_trait]
pub trait ManagedSecretStore: Send + Sync {
    /// Project this store reads from
    fn project_id(&self) -> &str;

    /// Payload of the latest version of `secret_name`, as text
    async fn access_latest(&self, secret_name: &str) -> Result<String>;
}

/// Source of bearer tokens for cloud APIs
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A currently valid bearer token
    async fn access_token(&self) -> Result<String>;
}

#[async_trait]
impl AccessTokenSource for CloudCliProbe {
    async fn access_token(&self) -> Result<String> {
        match CloudCliProbe::access_token(self).await {
            SourceOutcome::Found(token) => Ok(token),
            SourceOutcome::Absent { reason } => {
                Err(SwitchboardError::credential_source(self.program(), reason))
            }
        }
    }
}

/// Fixed bearer token
#[derive(Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

/// Build the shared HTTP client used by the store and the adapters
pub fn build_http_client(settings: &HttpSettings) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(settings.timeout_ms))
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| SwitchboardError::config_error(format!("Failed to build HTTP client: {e}")))
}

/// HTTP client for the managed secret store
pub struct SecretManagerClient {
    http: Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SecretManagerClient {
    /// Create a client for `project_id`
    pub fn new(
        http: Client,
        settings: &SecretStoreSettings,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            tokens,
        }
    }

    fn access_url(&self, secret_name: &str) -> String {
        format!(
            "{}/v1/{}:access",
            self.base_url,
            secret_version_name(&self.project_id, secret_name)
        )
    }
}

#[async_trait]
impl ManagedSecretStore for SecretManagerClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn access_latest(&self, secret_name: &str) -> Result<String> {
        let operation = format!("access secret '{secret_name}'");
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(self.access_url(secret_name))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SwitchboardError::operation_failed(&operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwitchboardError::operation_failed(
                &operation,
                format!("HTTP {}: {body}", status.as_u16()),
            ));
        }

        let parsed: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| SwitchboardError::operation_failed(&operation, e.to_string()))?;

        let bytes = STANDARD
            .decode(parsed.payload.data.as_bytes())
            .map_err(|e| SwitchboardError::operation_failed(&operation, format!("invalid payload: {e}")))?;

        String::from_utf8(bytes)
            .map_err(|e| SwitchboardError::operation_failed(&operation, format!("payload is not UTF-8: {e}")))
    }
}
