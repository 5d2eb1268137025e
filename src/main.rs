//! Switchboard CLI Entry Point
//!
//! Subcommands:
//! - `serve` - MCP server on stdio (for tool-calling hosts)
//! - `credentials` - Which credential sources resolved (never the values)
//! - `tools` - The tool catalogue with input schemas
//! - `clone` - Clone the configured repositories
//! - `config` - Show or initialize configuration files
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use switchboard::adapters::{self, build_adapters};
use switchboard::config::{self, ConfigLocation, Settings};
use switchboard::error::{Result, SwitchboardError};
use switchboard::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use switchboard::process::SystemCommandRunner;
use switchboard::secrets::SecretsResolver;
use switchboard::workspace::{self, GitCredentials};
use switchboard::{logging, ToolServer};

/// Switchboard - credential-resolving tool server
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Expose database, source-hosting and storage APIs as MCP tools")]
#[command(version)]
struct Cli {
    /// Load settings from this file instead of the local/global config files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (overridden by SWITCHBOARD_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio
    Serve,

    /// Report which credentials resolved
    Credentials,

    /// Print the tool catalogue
    Tools,

    /// Clone the configured repositories
    Clone {
        /// Directory to clone into
        #[arg(long, default_value = ".")]
        target: PathBuf,

        /// Username for the temporary credential helper
        #[arg(long, default_value = "x-access-token")]
        username: String,

        /// Clone without installing a credential helper
        #[arg(long)]
        no_credentials: bool,
    },

    /// Configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,

    /// Write default settings to a config file
    Init {
        /// Which file to write
        #[arg(long, value_enum, default_value_t = Location::Local)]
        location: Location,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Location {
    Local,
    Global,
}

impl From<Location> for ConfigLocation {
    fn from(location: Location) -> Self {
        match location {
            Location::Local => Self::Local,
            Location::Global => Self::Global,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (command, operation) = match &cli.command {
        Commands::Serve => ("serve", "serve"),
        Commands::Credentials => ("credentials", "status"),
        Commands::Tools => ("tools", "list"),
        Commands::Clone { .. } => ("clone", "clone"),
        Commands::Config { action: ConfigAction::Show } => ("config", "show"),
        Commands::Config { action: ConfigAction::Init { .. } } => ("config", "init"),
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_json(&ErrorEnvelope::from_error(command, operation, &e));
            ExitCode::FAILURE
        }
    }
}

fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => config::load_from_file(path),
        None => config::load_with_precedence(),
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

async fn resolve(settings: &Settings) -> SecretsResolver {
    let mut resolver = SecretsResolver::from_settings(settings).await;
    resolver.load().await;
    resolver
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let start = Instant::now();
    let elapsed = |start: Instant| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match cli.command {
        Commands::Serve => {
            let settings = load_settings(cli.config.as_deref())?;
            let resolver = Arc::new(resolve(&settings).await);
            let server = ToolServer::new(build_adapters(&resolver, &settings));
            server
                .serve()
                .await
                .map_err(|e| SwitchboardError::operation_failed("serve", e.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Credentials => {
            let settings = load_settings(cli.config.as_deref())?;
            let status = resolve(&settings).await.status();
            print_json(&SuccessEnvelope::new("credentials", "status", status, Metadata::new(elapsed(start))));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Tools => {
            let tools = adapters::catalogue();
            let meta = Metadata { execution_ms: elapsed(start), items_returned: Some(tools.len()) };
            print_json(&SuccessEnvelope::new("tools", "list", tools, meta));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Clone { target, username, no_credentials } => {
            let settings = load_settings(cli.config.as_deref())?;
            if settings.repositories.entries.is_empty() {
                return Err(SwitchboardError::config_error("No repositories configured"));
            }

            let credentials = if no_credentials {
                None
            } else {
                let resolver = resolve(&settings).await;
                let token = resolver.source_hosting_token().ok_or_else(|| {
                    SwitchboardError::credential_source(
                        "source hosting",
                        "no token resolved; use --no-credentials for public repositories",
                    )
                })?;
                Some(GitCredentials {
                    username,
                    token: token.to_string(),
                    host: settings.repositories.host.clone(),
                })
            };

            let runner =
                SystemCommandRunner::new(Duration::from_millis(settings.repositories.timeout_ms));
            let clone =
                workspace::clone_configured(&runner, &target, &settings.repositories, credentials.as_ref());

            // Dropping the clone future resets the credential helper
            let report = tokio::select! {
                report = clone => report?,
                _ = tokio::signal::ctrl_c() => {
                    return Err(SwitchboardError::operation_failed("clone", "interrupted"));
                }
            };

            let failed = !report.failed.is_empty();
            let meta = Metadata { execution_ms: elapsed(start), items_returned: Some(report.attempted()) };
            print_json(&SuccessEnvelope::new("clone", "clone", report, meta));
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }

        Commands::Config { action: ConfigAction::Show } => {
            let settings = load_settings(cli.config.as_deref())?;
            print_json(&SuccessEnvelope::new("config", "show", settings, Metadata::new(elapsed(start))));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config { action: ConfigAction::Init { location, force } } => {
            let path = match cli.config {
                Some(path) => path,
                None => config::config_path(location.into())?,
            };
            if path.exists() && !force {
                return Err(SwitchboardError::config_error(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }

            config::save_settings(&path, &Settings::default())?;
            let data = serde_json::json!({ "path": path.display().to_string() });
            print_json(&SuccessEnvelope::new("config", "init", data, Metadata::new(elapsed(start))));
            Ok(ExitCode::SUCCESS)
        }
    }
}
