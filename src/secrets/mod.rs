//! Layered Secrets Resolution
//!
//! Credentials come from three sources, highest trust first:
//! 1. A managed secret store (reachable once the cloud CLI reports a project)
//! 2. The local cloud CLI (project context, credentials path, bearer token)
//! 3. Process environment variables
//!
//! Each source produces a [`CredentialLayer`]. The [`CredentialSnapshot`] is the
//! left fold of [`CredentialSnapshot::fill_gaps`] over those layers, so later
//! sources only fill what earlier ones left unset.
//!
//! # Module Organization
//! - [`probe`] - Cloud CLI probe (project id, credentials path, token)
//! - [`store`] - Managed secret store client
//! - [`resolver`] - Stage orchestration and the public query surface

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub mod probe;
pub mod resolver;
pub mod store;

pub use probe::CloudCliProbe;
pub use resolver::{CredentialStatus, SecretsResolver};
pub use store::{secret_version_name, ManagedSecretStore, SecretManagerClient};

/// Secret holding the database endpoint URL
pub const DATABASE_URL_SECRET: &str = "database-url";
/// Secret holding the database public (anon) key
pub const DATABASE_ANON_KEY_SECRET: &str = "database-anon-key";
/// Secret holding the database privileged (service role) key
pub const DATABASE_SERVICE_ROLE_KEY_SECRET: &str = "database-service-role-key";
/// Secret holding the source-hosting token
pub const SOURCE_HOSTING_TOKEN_SECRET: &str = "source-hosting-token";

/// Environment variable fallback names
pub mod env_vars {
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DATABASE_ANON_KEY: &str = "DATABASE_ANON_KEY";
    pub const DATABASE_SERVICE_ROLE_KEY: &str = "DATABASE_SERVICE_ROLE_KEY";
    pub const SOURCE_HOSTING_TOKEN: &str = "SOURCE_HOSTING_TOKEN";
    pub const CLOUD_PROJECT: &str = "CLOUD_PROJECT";
}

/// Database credentials
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    /// Endpoint URL
    pub endpoint_url: String,
    /// Public (anon) key
    pub public_key: String,
    /// Privileged (service role) key, if resolved
    pub privileged_key: Option<String>,
}

impl DatabaseCredentials {
    /// Usable only when both the URL and the public key are non-empty
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.endpoint_url.is_empty() && !self.public_key.is_empty()
    }

    /// Key used for requests: the privileged key when present, else the public key
    #[must_use]
    pub fn request_key(&self) -> &str {
        self.privileged_key.as_deref().filter(|k| !k.is_empty()).unwrap_or(&self.public_key)
    }
}

// Keys must never reach logs
impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("endpoint_url", &self.endpoint_url)
            .field("public_key", &"<redacted>")
            .field("privileged_key", &self.privileged_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source-hosting credentials
#[derive(Clone, PartialEq, Eq)]
pub struct SourceHostingCredentials {
    /// Bearer token
    pub token: String,
}

impl std::fmt::Debug for SourceHostingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHostingCredentials").field("token", &"<redacted>").finish()
    }
}

/// Cloud project context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudContext {
    /// Project identifier
    pub project_id: Option<String>,
    /// Path to application-default credentials
    pub application_credentials_path: Option<PathBuf>,
}

impl CloudContext {
    /// The project id, if set and non-empty
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|p| !p.is_empty())
    }
}

/// Values produced by one credential source
///
/// Every field is optional; empty strings are treated the same as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialLayer {
    pub database_url: Option<String>,
    pub database_anon_key: Option<String>,
    pub database_service_role_key: Option<String>,
    pub source_hosting_token: Option<String>,
    pub project_id: Option<String>,
    pub application_credentials_path: Option<PathBuf>,
}

/// Outcome of asking one source for one value
///
/// Source failures are values, not errors: the resolver never propagates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome<T> {
    /// The source produced a value
    Found(T),
    /// The source had nothing, or failed; `reason` is for logs only
    Absent { reason: String },
}

impl<T> SourceOutcome<T> {
    /// Create an absent outcome
    pub fn absent(reason: impl Into<String>) -> Self {
        Self::Absent { reason: reason.into() }
    }

    /// Convert into an `Option`, discarding the reason
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent { .. } => None,
        }
    }

    /// Whether a value was produced
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl<T, E: std::fmt::Display> From<std::result::Result<T, E>> for SourceOutcome<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Found(value),
            Err(e) => Self::absent(e.to_string()),
        }
    }
}

/// Unified record of resolved credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub database: Option<DatabaseCredentials>,
    pub source_hosting: Option<SourceHostingCredentials>,
    pub cloud_context: Option<CloudContext>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

impl CredentialSnapshot {
    /// Fill unset fields from `layer`, never overwriting populated ones
    ///
    /// `database` is filled as a unit and only when the layer carries both the
    /// URL and the public key. `cloud_context` merges field by field.
    pub fn fill_gaps(&mut self, layer: &CredentialLayer) {
        if self.database.is_none() {
            if let (Some(endpoint_url), Some(public_key)) =
                (non_empty(layer.database_url.as_ref()), non_empty(layer.database_anon_key.as_ref()))
            {
                self.database = Some(DatabaseCredentials {
                    endpoint_url,
                    public_key,
                    privileged_key: non_empty(layer.database_service_role_key.as_ref()),
                });
            }
        }

        if self.source_hosting.is_none() {
            if let Some(token) = non_empty(layer.source_hosting_token.as_ref()) {
                self.source_hosting = Some(SourceHostingCredentials { token });
            }
        }

        let project_id = non_empty(layer.project_id.as_ref());
        let credentials_path = layer.application_credentials_path.clone();
        if project_id.is_some() || credentials_path.is_some() {
            let context = self.cloud_context.get_or_insert_with(CloudContext::default);
            if context.project().is_none() {
                if let Some(project_id) = project_id {
                    context.project_id = Some(project_id);
                }
            }
            if context.application_credentials_path.is_none() {
                context.application_credentials_path = credentials_path;
            }
        }
    }

    /// Usable database credentials, if any
    #[must_use]
    pub fn database(&self) -> Option<&DatabaseCredentials> {
        self.database.as_ref().filter(|db| db.is_usable())
    }

    /// Source-hosting token, if any
    #[must_use]
    pub fn source_hosting_token(&self) -> Option<&str> {
        self.source_hosting.as_ref().map(|s| s.token.as_str()).filter(|t| !t.is_empty())
    }

    /// Cloud context with a project id, if any
    #[must_use]
    pub fn cloud_context(&self) -> Option<&CloudContext> {
        self.cloud_context.as_ref().filter(|c| c.project().is_some())
    }
}

/// Merge layers in precedence order (first layer wins each field)
#[must_use]
pub fn merge_layers(layers: &[CredentialLayer]) -> CredentialSnapshot {
    let mut snapshot = CredentialSnapshot::default();
    for layer in layers {
        snapshot.fill_gaps(layer);
    }
    snapshot
}

/// Read-only view of environment variables
pub trait Environment: Send + Sync {
    /// Value of `key`; empty values read as unset
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Build the environment fallback layer
pub fn environment_layer(env: &dyn Environment) -> CredentialLayer {
    CredentialLayer {
        database_url: env.var(env_vars::DATABASE_URL),
        database_anon_key: env.var(env_vars::DATABASE_ANON_KEY),
        database_service_role_key: env.var(env_vars::DATABASE_SERVICE_ROLE_KEY),
        source_hosting_token: env.var(env_vars::SOURCE_HOSTING_TOKEN),
        project_id: env.var(env_vars::CLOUD_PROJECT),
        application_credentials_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layer_with_database(url: &str, key: &str) -> CredentialLayer {
        CredentialLayer {
            database_url: Some(url.to_string()),
            database_anon_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_database_requires_url_and_key() {
        let mut snapshot = CredentialSnapshot::default();
        snapshot.fill_gaps(&CredentialLayer {
            database_url: Some("https://db.example.com".to_string()),
            ..Default::default()
        });
        assert!(snapshot.database().is_none());

        snapshot.fill_gaps(&CredentialLayer {
            database_anon_key: Some("anon".to_string()),
            ..Default::default()
        });
        assert!(snapshot.database().is_none());
    }

    #[test]
    fn test_empty_public_key_is_not_present() {
        let snapshot = merge_layers(&[layer_with_database("https://db.example.com", "")]);
        assert!(snapshot.database.is_none());
        assert!(snapshot.database().is_none());
    }

    #[test]
    fn test_earlier_layer_wins() {
        let managed = layer_with_database("https://managed.example.com", "managed-key");
        let env = layer_with_database("https://env.example.com", "env-key");

        let snapshot = merge_layers(&[managed, env]);
        let db = snapshot.database().unwrap();
        assert_eq!(db.endpoint_url, "https://managed.example.com");
        assert_eq!(db.public_key, "managed-key");
    }

    #[test]
    fn test_database_is_filled_as_a_unit() {
        let managed = layer_with_database("https://managed.example.com", "managed-key");
        let env = CredentialLayer {
            database_service_role_key: Some("env-service".to_string()),
            ..layer_with_database("https://env.example.com", "env-key")
        };

        let snapshot = merge_layers(&[managed, env]);
        // Privileged key from a lower layer is not grafted onto a higher layer's record
        assert_eq!(snapshot.database().unwrap().privileged_key, None);
    }

    #[test]
    fn test_privileged_key_attached_when_present() {
        let layer = CredentialLayer {
            database_service_role_key: Some("service".to_string()),
            ..layer_with_database("https://db.example.com", "anon")
        };
        let snapshot = merge_layers(&[layer]);
        let db = snapshot.database().unwrap();
        assert_eq!(db.privileged_key.as_deref(), Some("service"));
        assert_eq!(db.request_key(), "service");
    }

    #[test]
    fn test_request_key_falls_back_to_public_key() {
        let snapshot = merge_layers(&[layer_with_database("https://db.example.com", "anon")]);
        assert_eq!(snapshot.database().unwrap().request_key(), "anon");
    }

    #[test]
    fn test_cloud_context_merges_field_by_field() {
        let probe = CredentialLayer {
            application_credentials_path: Some(PathBuf::from("/home/u/.config/gcloud/adc.json")),
            ..Default::default()
        };
        let env = CredentialLayer { project_id: Some("demo".to_string()), ..Default::default() };

        let snapshot = merge_layers(&[probe, env]);
        let context = snapshot.cloud_context().unwrap();
        assert_eq!(context.project_id.as_deref(), Some("demo"));
        assert_eq!(
            context.application_credentials_path,
            Some(PathBuf::from("/home/u/.config/gcloud/adc.json"))
        );
    }

    #[test]
    fn test_cloud_context_without_project_is_not_available() {
        let snapshot = merge_layers(&[CredentialLayer {
            application_credentials_path: Some(PathBuf::from("/tmp/adc.json")),
            ..Default::default()
        }]);
        assert!(snapshot.cloud_context.is_some());
        assert!(snapshot.cloud_context().is_none());
    }

    #[test]
    fn test_project_id_not_overwritten() {
        let probe = CredentialLayer { project_id: Some("from-cli".to_string()), ..Default::default() };
        let env = CredentialLayer { project_id: Some("from-env".to_string()), ..Default::default() };

        let snapshot = merge_layers(&[probe, env]);
        assert_eq!(snapshot.cloud_context().unwrap().project(), Some("from-cli"));
    }

    #[test]
    fn test_source_hosting_token_first_wins() {
        let first = CredentialLayer { source_hosting_token: Some("a".to_string()), ..Default::default() };
        let second = CredentialLayer { source_hosting_token: Some("b".to_string()), ..Default::default() };
        assert_eq!(merge_layers(&[first, second]).source_hosting_token(), Some("a"));
    }

    #[test]
    fn test_environment_layer_reads_contract_names() {
        let env: HashMap<String, String> = [
            ("DATABASE_URL", "https://db.example.com"),
            ("DATABASE_ANON_KEY", "anon"),
            ("SOURCE_HOSTING_TOKEN", ""),
            ("CLOUD_PROJECT", "demo"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let layer = environment_layer(&env);
        assert_eq!(layer.database_url.as_deref(), Some("https://db.example.com"));
        assert_eq!(layer.database_anon_key.as_deref(), Some("anon"));
        assert_eq!(layer.database_service_role_key, None);
        // Empty values read as unset
        assert_eq!(layer.source_hosting_token, None);
        assert_eq!(layer.project_id.as_deref(), Some("demo"));
    }

    #[test]
    fn test_source_outcome_from_result() {
        let ok: SourceOutcome<u8> = Ok::<u8, String>(7).into();
        assert_eq!(ok.found(), Some(7));

        let err: SourceOutcome<u8> = Err::<u8, String>("boom".to_string()).into();
        assert!(!err.is_found());
        assert_eq!(err, SourceOutcome::absent("boom"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let db = DatabaseCredentials {
            endpoint_url: "https://db.example.com".to_string(),
            public_key: "super-secret".to_string(),
            privileged_key: Some("even-more-secret".to_string()),
        };
        let rendered = format!("{db:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("even-more-secret"));

        let token = SourceHostingCredentials { token: "ghp_secret".to_string() };
        assert!(!format!("{token:?}").contains("ghp_secret"));
    }
}
