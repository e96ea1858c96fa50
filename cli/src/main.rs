use clap::Parser;
use coda_core::CodaConfig;
use coda_ipc::resolve_ask_socket_path;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing::{debug, warn};

mod ask;
mod cli;
mod logging;
mod output;

use crate::ask::{run_ask_command, CliExit, EXIT_SUCCESS};
use crate::cli::{Cli, Commands};
use crate::output::print_error;

/// Entry point for `coda`. Runs on a single-threaded runtime: one
/// invocation makes at most one outbound connection.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();

    // A broken config file must not block an ask; fall back to defaults.
    let (config, config_error) = match CodaConfig::load_from_default() {
        Ok(config) => (config, None),
        Err(e) => (CodaConfig::default(), Some(e)),
    };
    logging::init(args.verbose, config.log_level.as_deref());
    if let Some(e) = config_error {
        warn!("Ignoring config file: {}", e);
    }

    let outcome = match args.command {
        Commands::Ask(ask_args) => {
            let socket_path = match resolve_ask_socket_path() {
                Ok(path) => path,
                Err(e) => return report(Err(CliExit::runtime(e.to_string()))),
            };
            debug!(path = %socket_path.display(), "Resolved ask socket");

            let stdin = tokio::io::stdin();
            let stdin_is_terminal = io::stdin().is_terminal();
            let mut stdout = io::stdout().lock();
            run_ask_command(
                &ask_args,
                stdin,
                stdin_is_terminal,
                &mut stdout,
                &socket_path,
                interrupted(),
            )
            .await
        }
    };

    report(outcome)
}

/// Resolves on the first Ctrl-C. If the listener cannot be installed the
/// ask simply runs without interrupt support.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn report(outcome: Result<(), CliExit>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(exit) => {
            if let Some(message) = exit.message.as_deref().filter(|m| !m.is_empty()) {
                print_error(message);
            }
            ExitCode::from(exit.code)
        }
    }
}
