//! traefik-netsync daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use tokio::signal;

use traefik_netsync::cli::Cli;
use traefik_netsync::{logging, Config, DockerRuntime, EventDispatcher, ReconcileSettings, Reconciler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load(&cli)?;
    logging::init(&cfg.log_level)?;
    info!("Starting traefik-netsync with config: {:?}", cfg);

    let settings = ReconcileSettings::from_config(&cfg.traefik)?;

    // Container Runtime (Docker)
    let runtime = DockerRuntime::connect(&cfg.docker)?;
    let version = runtime
        .engine_version()
        .await
        .context("Docker engine is unreachable")?;
    info!("Connected to Docker engine {}", version);

    let dispatcher = EventDispatcher::new(Reconciler::new(Arc::new(runtime), settings));
    let mut dispatcher_handle = tokio::spawn(dispatcher.run());

    // Run until the event feed breaks or Ctrl+C
    tokio::select! {
        res = &mut dispatcher_handle => {
            let err = match res {
                Ok(Ok(())) => anyhow::anyhow!("event dispatcher stopped"),
                Ok(Err(e)) => e,
                Err(e) => e.into(),
            };
            error!("Event dispatcher failed: {:#}", err);
            return Err(err);
        }
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
    }

    dispatcher_handle.abort();
    info!("Shutdown complete.");
    Ok(())
}
