//! Shoal Client
//!
//! Headless client: restores this owner's shapes, optionally creates more,
//! and logs their motion until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use shoal_client::{
    flatten_error, ClientConfig, EventSource, Reconciler, ReconcilerConfig, ReconcilerEvent,
    ShoalClient,
};
use shoal_core::{init_telemetry, IoContext, TelemetryConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shoal client CLI
#[derive(Parser, Debug)]
#[command(name = "shoal-client")]
#[command(about = "Headless Shoal shape client")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    /// Number of new shapes to create after restoring
    #[arg(long, default_value_t = 0)]
    add: usize,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig::new("shoal-client").with_verbosity(cli.verbose))?;
    cli.config.validate().context("invalid configuration")?;

    let owner_id = cli.config.owner_id.unwrap_or_else(Uuid::new_v4);
    info!(owner_id = %owner_id, server = %cli.config.server_url, "Shoal client starting");

    let client = Arc::new(
        ShoalClient::new(&cli.config.server_url, cli.config.request_timeout())
            .context("Failed to create client")?,
    );
    let source = EventSource::new(client.hub_url(), cli.config.request_timeout())?;

    let (handle, mut events, task) = Reconciler::spawn(
        ReconcilerConfig {
            owner_id,
            liveness_interval: cli.config.liveness_interval(),
        },
        IoContext::production(),
        client.clone(),
        client,
        Box::new(source),
    );

    match handle.restore().await {
        Ok(count) => info!(count, "Restored shapes"),
        Err(e) => error!(error = %flatten_error(&e), "Failed to restore shapes"),
    }
    for _ in 0..cli.add {
        match handle.create_entity().await {
            Ok(shape_id) => info!(shape_id = %shape_id, "Created shape"),
            Err(e) => error!(error = %flatten_error(&e), "Failed to create shape"),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(ReconcilerEvent::Bound { shape_id, shape }) => {
                    info!(shape_id = %shape_id, x = shape.x, y = shape.y, "Bound");
                }
                Some(ReconcilerEvent::Updated { shape_id, shape }) => {
                    debug!(shape_id = %shape_id, x = shape.x, y = shape.y, "Moved");
                }
                Some(ReconcilerEvent::Evicted { shape_id, reason }) => {
                    warn!(shape_id = %shape_id, reason, "Evicted");
                }
                None => break,
            },
        }
    }

    handle.shutdown().await.context("shutdown failed")?;
    task.await.context("reconciler task failed")?;
    Ok(())
}
