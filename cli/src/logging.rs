use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides every other log level source.
pub const LOG_ENV_VAR: &str = "CODA_LOG";

pub(crate) const DEFAULT_LEVEL: &str = "warn";

/// Installs the stderr subscriber. Stdout carries protocol output only.
pub fn init(verbose: bool, config_level: Option<&str>) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(fallback_level(verbose, config_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();

    // Error lines are parsed by callers when stderr is not a terminal.
    if !io::stderr().is_terminal() {
        colored::control::set_override(false);
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_precedence() {
        assert_eq!(fallback_level(true, Some("error")), "debug");
        assert_eq!(fallback_level(false, Some("info")), "info");
        assert_eq!(fallback_level(false, Some("  ")), "warn");
        assert_eq!(fallback_level(false, None), "warn");
    }
}
