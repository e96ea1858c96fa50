use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides every other log level source.
pub const LOG_ENV_VAR: &str = "CODA_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Installs the stderr subscriber for the host process.
pub fn init(verbose: bool, config_level: Option<&str>) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(fallback_level(verbose, config_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn fallback_level(verbose: bool, config_level: Option<&str>) -> String {
    if verbose {
        return "debug".to_string();
    }
    config_level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_string()
}
