//! # agora-hubd
//!
//! Agora hub server binary — wires the hub actor to the HTTP/WebSocket
//! front end and runs until interrupted.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agora_hub::config::HubConfig;
use agora_hub::hub::Hub;
use agora_hub::metrics::install_recorder;
use agora_hub::server::HubServer;
use agora_hub::shutdown::ShutdownCoordinator;
use agora_hub::ticker::run_ticker;

/// Agora real-time hub.
#[derive(Parser, Debug)]
#[command(name = "agora-hubd", about = "Agora real-time hub server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "9470")]
    port: u16,

    /// Seconds between periodic system notifications (0 disables).
    #[arg(long, default_value = "0")]
    system_tick_secs: u64,

    /// Ping interval in seconds for idle connection liveness.
    #[arg(long, default_value = "30")]
    ping_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let metrics_handle = install_recorder().context("failed to install metrics recorder")?;

    let config = HubConfig {
        host: args.host,
        port: args.port,
        system_tick_secs: args.system_tick_secs,
        ping_interval_secs: args.ping_interval_secs,
        ..HubConfig::default()
    };

    let shutdown = ShutdownCoordinator::new();
    let (hub, handle) = Hub::new(shutdown.token());
    let hub_task = tokio::spawn(hub.run());

    let mut tasks = vec![hub_task];
    if config.ticker_enabled() {
        let interval = Duration::from_secs(config.system_tick_secs);
        tasks.push(tokio::spawn(run_ticker(
            handle.clone(),
            interval,
            shutdown.token(),
        )));
    }

    let server = HubServer::new(config, handle).with_metrics(metrics_handle);
    let running = server
        .start(shutdown.token())
        .await
        .context("failed to bind server")?;
    tracing::info!("agora hub listening on http://{}", running.addr);
    tasks.push(running.handle);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    shutdown.drain(tasks, None).await;
    tracing::info!("shutdown complete");
    Ok(())
}
