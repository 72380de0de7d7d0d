//! Shoal Server
//!
//! Standalone Shoal server binary.

use anyhow::Context;
use clap::Parser;
use shoal_core::{init_telemetry, IoContext, ShoalConfig, TelemetryConfig};
use shoal_server::Server;
use shoal_storage::{MemoryKV, MemoryVersionedKV};
use std::future::IntoFuture;
use std::sync::Arc;

/// Shoal server CLI
#[derive(Parser, Debug)]
#[command(name = "shoal-server")]
#[command(about = "Shoal shape actor server")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address, overrides the configuration file
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig::new("shoal-server").with_verbosity(cli.verbose))?;

    let mut config = match &cli.config {
        Some(path) => ShoalConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ShoalConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.node.bind_address = bind;
    }
    config.validate().context("invalid configuration")?;

    let server = Server::start(
        &config,
        Arc::new(MemoryKV::new()),
        Arc::new(MemoryVersionedKV::new()),
        IoContext::production(),
    )
    .await
    .context("failed to start server")?;

    let listener = tokio::net::TcpListener::bind(&config.node.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.node.bind_address))?;
    tracing::info!(addr = %config.node.bind_address, "Shoal server listening");

    // Push connections never finish on their own, so Ctrl-C drops the listener
    // instead of draining it
    tokio::select! {
        result = axum::serve(listener, server.router()).into_future() => {
            result.context("http server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    server.shutdown().await.context("shutdown failed")?;
    Ok(())
}
