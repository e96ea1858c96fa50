use clap::{Args, Parser, Subcommand};

/// Command-line client for the Coda desktop host
#[derive(Parser, Debug)]
#[command(name = "coda", author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Request structured user input from the desktop UI
    #[command(after_help = ASK_EXAMPLES)]
    Ask(AskArgs),
}

const ASK_EXAMPLES: &str = "Examples:
  echo '{\"questions\":[...]}' | coda ask
  cat ./fixtures/ask/multi-question.json | coda ask --json
  cat ./fixtures/ask/multi-question-timeout.json | coda ask --timeout-ms 30000";

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    /// Timeout in milliseconds (0 waits forever)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub timeout_ms: String,

    /// Print the response batch as a single JSON line
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub const INVALID_TIMEOUT_MESSAGE: &str = "--timeout-ms must be a non-negative integer";

impl AskArgs {
    /// Parsed `--timeout-ms`. Checked by the ask flow so a bad value
    /// reports like every other validation failure.
    pub fn timeout_ms(&self) -> Result<u64, &'static str> {
        self.timeout_ms
            .trim()
            .parse::<u64>()
            .map_err(|_| INVALID_TIMEOUT_MESSAGE)
    }
}

impl Default for AskArgs {
    fn default() -> Self {
        Self {
            timeout_ms: "0".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_defaults() {
        let cli = Cli::try_parse_from(["coda", "ask"]).unwrap();
        let Commands::Ask(args) = cli.command;
        assert_eq!(args.timeout_ms(), Ok(0));
        assert!(!args.json);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_ask_flags() {
        let cli =
            Cli::try_parse_from(["coda", "ask", "--timeout-ms", "30000", "--json", "-v"]).unwrap();
        let Commands::Ask(args) = cli.command;
        assert_eq!(args.timeout_ms(), Ok(30000));
        assert!(args.json);
        assert!(cli.verbose);
    }

    #[test]
    fn test_invalid_timeout_parses_but_fails_validation() {
        for raw in ["-1", "abc", "1.5", ""] {
            let cli = Cli::try_parse_from(["coda", "ask", "--timeout-ms", raw]).unwrap();
            let Commands::Ask(args) = cli.command;
            assert_eq!(args.timeout_ms(), Err(INVALID_TIMEOUT_MESSAGE));
        }
    }
}
