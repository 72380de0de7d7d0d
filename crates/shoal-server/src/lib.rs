//! Shoal Server Library
//!
//! Shape actors, the entity index, and the push relay behind one HTTP
//! surface.
//!
//! # Overview
//!
//! ```text
//! client ──HTTP──▶ actors/shape/..  ──▶ dispatcher ──▶ ShapeActor ──reminder──┐
//!        ◀──SSE─── shapehub ◀── Relay ◀── BusConsumer ◀── InMemoryBus ◀───────┘
//!        ──HTTP──▶ entities/..      ──▶ IndexService ──CAS──▶ VersionedKV
//! ```

pub mod actor;
pub mod api;
pub mod bus;
pub mod models;
pub mod service;
pub mod state;

use actor::ShapeActor;
use axum::Router;
use bus::{EventBus, InMemoryBus};
use service::{BusConsumer, IndexService, Relay};
use shoal_core::{IoContext, Result, ShoalConfig};
use shoal_runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
use shoal_storage::{ActorKV, VersionedKV};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A running server: actor runtime, bus consumer and HTTP state
pub struct Server {
    runtime: Runtime<ShapeActor>,
    consumer: BusConsumer,
    bus: Arc<InMemoryBus>,
    state: AppState,
}

impl Server {
    /// Wire every component and start the actor runtime
    ///
    /// `kv` holds shape state and reminder registrations; `store` holds the
    /// entity index. Persisted reminders are re-armed before this returns.
    pub async fn start(
        config: &ShoalConfig,
        kv: Arc<dyn ActorKV>,
        store: Arc<dyn VersionedKV>,
        io: IoContext,
    ) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(InMemoryBus::new(config.bus.topic_capacity));
        let relay = Relay::new(config.relay.channel_capacity);
        let index = IndexService::new(store, relay.clone(), &config.index);

        let actor = ShapeActor::new(bus.clone(), io.rng.clone(), &config.shape);
        let mut runtime = RuntimeBuilder::new()
            .with_actor(actor)
            .with_kv(kv)
            .with_time(io.time.clone())
            .with_config(RuntimeConfig::from(config))
            .build()?;

        // Subscribe before any actor can publish
        let consumer = BusConsumer::spawn(bus.as_ref(), index.clone())?;
        let restored = runtime.start().await?;

        let state = AppState::new(
            runtime.dispatcher_handle(),
            runtime.reminders().clone(),
            index,
            relay,
            Duration::from_millis(config.relay.keep_alive_interval_ms),
        );

        info!(reminders_restored = restored, "Shoal server started");
        Ok(Self {
            runtime,
            consumer,
            bus,
            state,
        })
    }

    /// HTTP router over this server's state
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The in-process bus shape actors publish on
    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    /// Stop reminders and actors, then the bus consumer
    ///
    /// Reminder registrations and shape state stay in storage.
    pub async fn shutdown(mut self) -> Result<()> {
        self.runtime.stop().await?;
        self.consumer.shutdown().await;
        info!("Shoal server stopped");
        Ok(())
    }
}
