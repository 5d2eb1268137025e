//! Logging Setup
//!
//! Structured logs go to stderr; stdout is reserved for JSON-RPC and JSON output.
//! The filter comes from `SWITCHBOARD_LOG` (same syntax as `RUST_LOG`), falling
//! back to `info`, or `debug` with `--verbose`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "SWITCHBOARD_LOG";

/// Level used when the environment does not set a filter
#[must_use]
pub const fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Build the filter from `SWITCHBOARD_LOG`, ignoring invalid directives
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level(verbose).into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy()
}

/// Install the global subscriber
///
/// Calling this twice is harmless; the second call leaves the first subscriber in place.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(env_filter(verbose))
        .try_init();
}
