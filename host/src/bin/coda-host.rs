use anyhow::{Context, Result};
use clap::Parser;
use coda_core::{get_default_config_file, CodaConfig};
use coda_host::{
    bind_ask_socket, logging, run_notification_listener, run_sweeper, spawn_console, AskInbox,
    AskNotifier, AskRegistry, AskSocketServer,
};
use coda_ipc::resolve_ask_socket_path;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Reference Coda host: answers `coda ask` requests from a terminal inbox.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.coda/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Serve the socket without the interactive inbox
    #[arg(long)]
    no_inbox: bool,

    /// Write a default config file (if none exists) and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        return init_config(args.config);
    }

    let config = match &args.config {
        Some(path) => CodaConfig::load_from_file(path),
        None => CodaConfig::load_from_default(),
    }
    .context("Failed to load Coda configuration")?;
    logging::init(args.verbose, config.log_level.as_deref());
    info!("Starting Coda host...");

    let socket_path = resolve_ask_socket_path().context("Failed to resolve ask socket path")?;
    let listener = bind_ask_socket(&socket_path)
        .with_context(|| format!("Failed to bind ask socket at {}", socket_path.display()))?;

    let registry = AskRegistry::new(config.registry.expired_retention());
    let notifier = AskNotifier::new();

    let sweeper = tokio::spawn(run_sweeper(
        registry.clone(),
        config.registry.sweep_interval(),
    ));
    let listener_task = tokio::spawn(run_notification_listener(notifier.subscribe()));

    let inbox = Arc::new(AskInbox::new(
        Arc::new(registry.clone()),
        config.inbox.poll_interval(),
    ));
    let poller = inbox.spawn_poller();

    // Set up shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    install_signal_handlers(shutdown_tx.clone())?;

    if args.no_inbox {
        info!("Inbox disabled; serving the ask socket only");
    } else if !io::stdin().is_terminal() {
        warn!("stdin is not a terminal; inbox console disabled");
    } else {
        spawn_console(
            Arc::clone(&inbox),
            tokio::runtime::Handle::current(),
            shutdown_tx.clone(),
        )
        .context("Failed to start inbox console")?;
    }
    drop(shutdown_tx);

    AskSocketServer::new(registry, notifier)
        .run(listener, shutdown_rx)
        .await;

    poller.stop().await;
    sweeper.abort();
    listener_task.abort();

    if let Err(e) = fs::remove_file(&socket_path) {
        error!("Failed to remove socket file during shutdown: {}", e);
    }
    info!("Coda host shutdown complete");
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => get_default_config_file().context("Failed to resolve config path")?,
    };
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    CodaConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Forwards SIGINT and SIGTERM to the shutdown channel.
fn install_signal_handlers(shutdown_tx: mpsc::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
        }
        let _ = shutdown_tx.send(()).await;
    });
    Ok(())
}
