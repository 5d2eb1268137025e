//! Secrets Resolver
//!
//! Produces the most complete [`CredentialSnapshot`] obtainable from the
//! managed store, the cloud CLI and the environment.
//!
//! # Lifecycle
//! 1. [`SecretsResolver::initialize`] probes the CLI for project context and,
//!    if a project id was found, connects a managed store handle.
//! 2. [`SecretsResolver::load`] runs three stages in order:
//!    managed store → CLI token → environment. Each stage only fills gaps.
//! 3. The resolver is then shared read-only (`Arc<SecretsResolver>`).
//!
//! No method here returns an error; failed sources are logged and left unset.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::probe::CloudCliProbe;
use super::store::{build_http_client, ManagedSecretStore, SecretManagerClient};
use super::{
    environment_layer, CloudContext, CredentialLayer, CredentialSnapshot, DatabaseCredentials,
    Environment, ProcessEnvironment, SourceOutcome, DATABASE_ANON_KEY_SECRET,
    DATABASE_SERVICE_ROLE_KEY_SECRET, DATABASE_URL_SECRET, SOURCE_HOSTING_TOKEN_SECRET,
};
use crate::config::Settings;
use crate::error::Result;
use crate::process::SystemCommandRunner;

/// Availability report (never includes secret values)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub database: bool,
    pub database_privileged: bool,
    pub source_hosting: bool,
    pub cloud_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub managed_store: bool,
}

/// Orchestrates credential sources into one snapshot
pub struct SecretsResolver {
    snapshot: CredentialSnapshot,
    probe: CloudCliProbe,
    store: Option<Arc<dyn ManagedSecretStore>>,
    environment: Arc<dyn Environment>,
}

impl SecretsResolver {
    /// Probe the CLI and connect the managed store when a project id is known
    ///
    /// `connect_store` is only called with a non-empty project id. A connect
    /// failure is logged and leaves the store unset.
    pub async fn initialize<F>(
        probe: CloudCliProbe,
        environment: Arc<dyn Environment>,
        connect_store: F,
    ) -> Self
    where
        F: FnOnce(&str) -> Result<Arc<dyn ManagedSecretStore>>,
    {
        let mut snapshot = CredentialSnapshot::default();
        snapshot.fill_gaps(&probe.context_layer().await);

        let store = match snapshot.cloud_context().and_then(CloudContext::project) {
            Some(project_id) => match connect_store(project_id) {
                Ok(store) => {
                    debug!(project_id, "managed secret store connected");
                    Some(store)
                }
                Err(e) => {
                    warn!(project_id, error = %e, "could not connect managed secret store");
                    None
                }
            },
            None => {
                debug!("no cloud project from CLI; managed secret store skipped");
                None
            }
        };

        Self { snapshot, probe, store, environment }
    }

    /// Production wiring: system CLI runner, process environment, HTTP secret store
    pub async fn from_settings(settings: &Settings) -> Self {
        let runner = Arc::new(SystemCommandRunner::new(std::time::Duration::from_millis(
            settings.cli.timeout_ms,
        )));
        let probe = CloudCliProbe::new(runner, settings.cli.clone());
        let token_probe = Arc::new(probe.clone());

        Self::initialize(probe, Arc::new(ProcessEnvironment), |project_id| {
            let http = build_http_client(&settings.http)?;
            let store: Arc<dyn ManagedSecretStore> = Arc::new(SecretManagerClient::new(
                http,
                &settings.secret_store,
                project_id,
                token_probe,
            ));
            Ok(store)
        })
        .await
    }

    /// Run the three load stages in order
    pub async fn load(&mut self) {
        if let Some(layer) = self.managed_store_layer().await {
            self.snapshot.fill_gaps(&layer);
        }

        if self.snapshot.source_hosting_token().is_none() {
            self.snapshot.fill_gaps(&self.cli_token_layer().await);
        }

        self.snapshot.fill_gaps(&environment_layer(self.environment.as_ref()));

        let status = self.status();
        info!(
            database = status.database,
            source_hosting = status.source_hosting,
            cloud_context = status.cloud_context,
            "credentials loaded"
        );
    }

    /// Stage 1: fetch every known secret independently
    async fn managed_store_layer(&self) -> Option<CredentialLayer> {
        let store = self.store.as_ref()?;

        let fetch = |name: &'static str| {
            let store = Arc::clone(store);
            async move {
                let outcome: SourceOutcome<String> = store.access_latest(name).await.into();
                if let SourceOutcome::Absent { reason } = &outcome {
                    warn!(secret = name, %reason, "managed secret unavailable");
                }
                outcome.found()
            }
        };

        Some(CredentialLayer {
            database_url: fetch(DATABASE_URL_SECRET).await,
            database_anon_key: fetch(DATABASE_ANON_KEY_SECRET).await,
            database_service_role_key: fetch(DATABASE_SERVICE_ROLE_KEY_SECRET).await,
            source_hosting_token: fetch(SOURCE_HOSTING_TOKEN_SECRET).await,
            ..Default::default()
        })
    }

    /// Stage 2: application-default token from the CLI; failures are silent
    async fn cli_token_layer(&self) -> CredentialLayer {
        CredentialLayer {
            source_hosting_token: self.probe.access_token().await.found(),
            ..Default::default()
        }
    }

    /// The full snapshot
    #[must_use]
    pub const fn snapshot(&self) -> &CredentialSnapshot {
        &self.snapshot
    }

    /// Usable database credentials
    #[must_use]
    pub fn database_config(&self) -> Option<&DatabaseCredentials> {
        self.snapshot.database()
    }

    /// Source-hosting token
    #[must_use]
    pub fn source_hosting_token(&self) -> Option<&str> {
        self.snapshot.source_hosting_token()
    }

    /// Cloud context with a project id
    #[must_use]
    pub fn cloud_context(&self) -> Option<&CloudContext> {
        self.snapshot.cloud_context()
    }

    #[must_use]
    pub fn has_database(&self) -> bool {
        self.database_config().is_some()
    }

    #[must_use]
    pub fn has_source_hosting(&self) -> bool {
        self.source_hosting_token().is_some()
    }

    #[must_use]
    pub fn has_cloud_context(&self) -> bool {
        self.cloud_context().is_some()
    }

    /// The probe used for CLI-derived tokens
    #[must_use]
    pub const fn probe(&self) -> &CloudCliProbe {
        &self.probe
    }

    /// The managed store handle, if one was connected
    #[must_use]
    pub fn managed_store(&self) -> Option<Arc<dyn ManagedSecretStore>> {
        self.store.clone()
    }

    /// Redacted availability report
    #[must_use]
    pub fn status(&self) -> CredentialStatus {
        CredentialStatus {
            database: self.has_database(),
            database_privileged: self
                .database_config()
                .is_some_and(|db| db.privileged_key.is_some()),
            source_hosting: self.has_source_hosting(),
            cloud_context: self.has_cloud_context(),
            project_id: self.cloud_context().and_then(|c| c.project_id.clone()),
            managed_store: self.store.is_some(),
        }
    }
}
