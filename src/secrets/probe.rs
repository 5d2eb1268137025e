//! Cloud CLI Probe
//!
//! Reads ambient context from the locally installed cloud CLI:
//! - current project: `config get-value project`
//! - credentials path: `<global config dir>/application_default_credentials.json`
//! - bearer token: the configured token arguments
//!
//! Every query returns a [`SourceOutcome`]; nothing here fails outward.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{CredentialLayer, SourceOutcome};
use crate::config::CliSettings;
use crate::process::CommandRunner;

const APPLICATION_DEFAULT_CREDENTIALS_FILE: &str = "application_default_credentials.json";

/// Probe for the ambient cloud CLI
#[derive(Clone)]
pub struct CloudCliProbe {
    runner: Arc<dyn CommandRunner>,
    settings: CliSettings,
}

impl CloudCliProbe {
    /// Create a probe over the given runner
    pub fn new(runner: Arc<dyn CommandRunner>, settings: CliSettings) -> Self {
        Self { runner, settings }
    }

    /// CLI program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.settings.program
    }

    /// Run the CLI and return trimmed stdout, or why it produced nothing
    async fn query(&self, args: &[String]) -> SourceOutcome<String> {
        let output = match self.runner.run(&self.settings.program, args, None).await {
            Ok(output) => output,
            Err(e) => return SourceOutcome::absent(e.to_string()),
        };

        match output.into_stdout(&self.settings.program) {
            Ok(stdout) if stdout.is_empty() => SourceOutcome::absent("empty output"),
            Ok(stdout) => SourceOutcome::Found(stdout),
            Err(e) => SourceOutcome::absent(e.to_string()),
        }
    }

    /// Current project identifier
    pub async fn project_id(&self) -> SourceOutcome<String> {
        let args = ["config", "get-value", "project"].map(String::from);
        match self.query(&args).await {
            // The CLI prints "(unset)" instead of failing when no project is configured
            SourceOutcome::Found(project) if project == "(unset)" => {
                SourceOutcome::absent("no project configured")
            }
            outcome => outcome,
        }
    }

    /// Path to the application-default credentials file, if it exists
    pub async fn application_credentials_path(&self) -> SourceOutcome<PathBuf> {
        let args = ["info", "--format=value(config.paths.global_config_dir)"].map(String::from);
        match self.query(&args).await {
            SourceOutcome::Found(dir) => {
                let path = PathBuf::from(dir).join(APPLICATION_DEFAULT_CREDENTIALS_FILE);
                if path.is_file() {
                    SourceOutcome::Found(path)
                } else {
                    SourceOutcome::absent(format!("{} does not exist", path.display()))
                }
            }
            SourceOutcome::Absent { reason } => SourceOutcome::Absent { reason },
        }
    }

    /// Application-default bearer token
    pub async fn access_token(&self) -> SourceOutcome<String> {
        self.query(&self.settings.token_args).await
    }

    /// Cloud context layer (project id and credentials path)
    pub async fn context_layer(&self) -> CredentialLayer {
        let project_id = self.project_id().await;
        if let SourceOutcome::Absent { reason } = &project_id {
            debug!(program = %self.program(), %reason, "cloud CLI reported no project");
        }

        let credentials_path = self.application_credentials_path().await;
        if let SourceOutcome::Absent { reason } = &credentials_path {
            debug!(program = %self.program(), %reason, "no application-default credentials");
        }

        CredentialLayer {
            project_id: project_id.found(),
            application_credentials_path: credentials_path.found(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::ScriptedRunner;
    use crate::process::CommandOutput;

    fn probe(runner: ScriptedRunner) -> CloudCliProbe {
        CloudCliProbe::new(Arc::new(runner), CliSettings::default())
    }

    #[tokio::test]
    async fn test_project_id_found() {
        let runner = ScriptedRunner::new()
            .on("gcloud config get-value project", CommandOutput::success("demo"));
        assert_eq!(probe(runner).project_id().await, SourceOutcome::Found("demo".to_string()));
    }

    #[tokio::test]
    async fn test_project_id_unset_is_absent() {
        let runner = ScriptedRunner::new()
            .on("gcloud config get-value project", CommandOutput::success("(unset)"));
        assert!(!probe(runner).project_id().await.is_found());
    }

    #[tokio::test]
    async fn test_missing_cli_is_absent() {
        let runner = ScriptedRunner::new().missing("gcloud");
        let probe = probe(runner);
        assert!(!probe.project_id().await.is_found());
        assert!(!probe.access_token().await.is_found());
        assert_eq!(probe.context_layer().await, CredentialLayer::default());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_absent() {
        let runner = ScriptedRunner::new().on(
            "gcloud auth application-default print-access-token",
            CommandOutput::failure(1, "ERROR: Please run gcloud auth application-default login"),
        );
        let outcome = probe(runner).access_token().await;
        match outcome {
            SourceOutcome::Absent { reason } => assert!(reason.contains("application-default login")),
            SourceOutcome::Found(_) => panic!("expected absent token"),
        }
    }

    #[tokio::test]
    async fn test_credentials_path_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();

        let runner = ScriptedRunner::new().on("gcloud info", CommandOutput::success(dir_str.clone()));
        let probe = probe(runner);
        assert!(!probe.application_credentials_path().await.is_found());

        let adc = dir.path().join(APPLICATION_DEFAULT_CREDENTIALS_FILE);
        std::fs::write(&adc, "{}").unwrap();
        assert_eq!(probe.application_credentials_path().await, SourceOutcome::Found(adc));
    }

    #[tokio::test]
    async fn test_custom_token_args() {
        let runner = Arc::new(
            ScriptedRunner::new().on("cloud-cli token print", CommandOutput::success("tok")),
        );
        let settings = CliSettings {
            program: "cloud-cli".to_string(),
            token_args: vec!["token".to_string(), "print".to_string()],
            ..Default::default()
        };
        let probe = CloudCliProbe::new(runner.clone(), settings);

        assert_eq!(probe.access_token().await, SourceOutcome::Found("tok".to_string()));
        assert_eq!(runner.calls()[0].command_line(), "cloud-cli token print");
    }
}
