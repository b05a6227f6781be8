mod commands;
mod scheduler;

use anyhow::Result;
use clap::Parser;
use privet_core::{config, message, privet, EventEmitter, LocalDiscoveryController, Message, VisibilityCounter};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Headless local discovery host: JSON commands on stdin, JSON events on stdout
#[derive(Parser, Debug)]
#[command(name = "privet-agent")]
#[command(author, version, about)]
struct Args {
    /// Config file (default: ~/.config/privet-agent/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the event stream
    let default_filter = if args.verbose {
        "privet_agent=debug,privet_core=debug"
    } else {
        "privet_agent=info,privet_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Privet Agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(),
    };
    info!(
        "Cloud URL {} (from {}), {} configured devices",
        config.cloud_url,
        config.cloud_url_source,
        config.devices.len()
    );

    let collaborators = privet::default_collaborators(&config)?;
    let (tx, rx) = message::channel();
    let (events, event_rx) = EventEmitter::channel();

    let controller = LocalDiscoveryController::new(collaborators, tx.clone(), events);
    let controller_task = tokio::spawn(controller.run(rx));
    let writer_task = tokio::spawn(commands::write_events(event_rx, tokio::io::stdout()));

    let cancel = CancellationToken::new();
    let poller = scheduler::start_discovery_polling(
        tx.clone(),
        config.discovery_poll_interval,
        VisibilityCounter::global(),
        cancel.clone(),
    );

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                interrupt.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let lines = commands::spawn_stdin_reader()?;
    commands::forward_commands(lines, tx.clone(), cancel.clone()).await;

    cancel.cancel();
    if tx.send(Message::Shutdown).is_err() {
        tracing::debug!("Controller already stopped");
    }
    if let Err(e) = controller_task.await {
        tracing::error!("Controller task failed: {}", e);
    }
    if let Err(e) = poller.await {
        tracing::error!("Discovery poller task failed: {}", e);
    }

    // The controller owned every emitter, so the writer drains and ends
    match writer_task.await {
        Ok(Err(e)) => tracing::warn!("Failed to write events: {:#}", e),
        Err(e) => tracing::error!("Event writer task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Privet Agent stopped");
    Ok(())
}
