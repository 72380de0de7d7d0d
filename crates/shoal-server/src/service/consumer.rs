//! Bus consumer feeding the index service
//!
//! TigerStyle: One task per topic, explicit shutdown.
//!
//! Mirrors the HTTP subscription routes in process: created events add to
//! the owner's index, deleted events remove from it, and position changes
//! go to the relay. Handlers are idempotent, so redelivery is harmless.

use super::index::IndexService;
use crate::bus::EventBus;
use shoal_core::events::{
    ShapeEvent, TOPICS_ALL, TOPIC_ENTITY_CREATED, TOPIC_ENTITY_DELETED,
    TOPIC_ENTITY_POSITION_CHANGED,
};
use shoal_core::{Error, Result};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Running subscription of the index service to every bus topic
pub struct BusConsumer {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BusConsumer {
    /// Subscribe to all topics and start dispatching
    pub fn spawn(bus: &dyn EventBus, index: IndexService) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(TOPICS_ALL.len());

        for topic in TOPICS_ALL {
            let rx = bus.subscribe(topic)?;
            let index = index.clone();
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(consume(topic, rx, index, shutdown_rx)));
        }

        info!(topics = TOPICS_ALL.len(), "Bus consumer started");
        Ok(Self { shutdown_tx, tasks })
    }

    /// Stop consuming; events already being handled complete first
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Bus consumer task panicked");
            }
        }
        info!("Bus consumer stopped");
    }
}

/// Apply one event to the index service
pub async fn dispatch(index: &IndexService, topic: &str, event: ShapeEvent) -> Result<()> {
    match topic {
        TOPIC_ENTITY_CREATED => {
            index.add_entity(event.client_id, event.shape_id).await?;
        }
        TOPIC_ENTITY_DELETED => {
            index.remove_entity(event.client_id, event.shape_id).await?;
        }
        TOPIC_ENTITY_POSITION_CHANGED => {
            index.relay_position_changed(event.client_id, event.shape_id);
        }
        _ => {
            return Err(Error::InvalidOperation {
                operation: format!("no route for topic {}", topic),
            })
        }
    }
    Ok(())
}

async fn consume(
    topic: &'static str,
    mut rx: broadcast::Receiver<ShapeEvent>,
    index: IndexService,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            received = rx.recv() => match received {
                Ok(event) => {
                    if let Err(e) = dispatch(&index, topic, event).await {
                        warn!(
                            topic,
                            owner_id = %event.client_id,
                            entity_id = %event.shape_id,
                            error = %e,
                            "Failed to handle bus event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic, skipped, "Bus consumer lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(topic, "Bus topic closed");
                    break;
                }
            },
        }
    }
}
