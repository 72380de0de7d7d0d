//! Client reconciler
//!
//! TigerStyle: One task owns the bindings; everything else sends it commands.
//!
//! Keeps the client's view of its own shapes in step with the server:
//! - a change notification re-reads the shape, but only if it is bound here
//! - a liveness pass re-reads every bound shape on a fixed interval and
//!   evicts any that fail; a pass still running when the next tick arrives
//!   makes that tick a no-op
//! - shutdown stops the liveness loop, unregisters every bound shape's
//!   reminder (failures are logged), then releases the push subscription
//!
//! Network calls never run on the coordinating task. They are spawned and
//! report back as commands, so a slow server delays results, not commands.

use crate::client::{IndexApi, ShapeApi};
use crate::events::NotificationSource;
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use shoal_core::constants::RECONCILER_COMMAND_BUFFER_COUNT;
use shoal_core::{IoContext, Shape, ShapeKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What the reconciler reports to whoever renders shapes
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerEvent {
    /// A shape was created or restored and is now bound
    Bound { shape_id: Uuid, shape: Shape },
    /// A bound shape was re-read
    Updated { shape_id: Uuid, shape: Shape },
    /// A bound shape failed its liveness check and was dropped
    Evicted { shape_id: Uuid, reason: String },
}

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub owner_id: Uuid,
    pub liveness_interval: Duration,
}

/// Outcome of one position read
type PositionCheck = (Uuid, std::result::Result<Shape, String>);

enum Command {
    Create {
        reply: oneshot::Sender<Result<Uuid>>,
    },
    Restore {
        reply: oneshot::Sender<Result<usize>>,
    },
    Snapshot {
        reply: oneshot::Sender<HashMap<Uuid, Shape>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    // Results of spawned calls
    Activated {
        shape_id: Uuid,
        result: Result<Shape>,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    Restored {
        result: Result<Vec<PositionCheck>>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Refreshed {
        shape_id: Uuid,
        result: Result<Shape>,
    },
    LivenessChecked {
        checks: Vec<PositionCheck>,
    },
}

/// Cloneable handle to the reconciler task
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<Command>,
}

impl ReconcilerHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("reconciler stopped"))?;
        rx.await.map_err(|_| anyhow!("reconciler stopped"))
    }

    /// Create a new shape, activate it and bind it
    pub async fn create_entity(&self) -> Result<Uuid> {
        self.call(|reply| Command::Create { reply }).await?
    }

    /// Bind every shape the index lists for this owner
    ///
    /// Returns how many were bound. Shapes that fail to activate are logged
    /// and left unbound.
    pub async fn restore(&self) -> Result<usize> {
        self.call(|reply| Command::Restore { reply }).await?
    }

    /// Last known state of every bound shape
    pub async fn snapshot(&self) -> Result<HashMap<Uuid, Shape>> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Run the shutdown sequence and wait for it to finish
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Command::Shutdown { reply }).await
    }
}

/// The coordinating task's state
pub struct Reconciler {
    config: ReconcilerConfig,
    io: IoContext,
    index: Arc<dyn IndexApi>,
    shapes: Arc<dyn ShapeApi>,
    source: Box<dyn NotificationSource>,
    bindings: HashMap<Uuid, Shape>,
    liveness_busy: bool,
    tx: mpsc::WeakSender<Command>,
    events_tx: mpsc::Sender<ReconcilerEvent>,
}

impl Reconciler {
    /// Subscribe to notifications and start the coordinating task
    ///
    /// Events for the rendering side arrive on the returned receiver; they
    /// are dropped with a warning when it falls behind.
    pub fn spawn(
        config: ReconcilerConfig,
        io: IoContext,
        index: Arc<dyn IndexApi>,
        shapes: Arc<dyn ShapeApi>,
        mut source: Box<dyn NotificationSource>,
    ) -> (
        ReconcilerHandle,
        mpsc::Receiver<ReconcilerEvent>,
        JoinHandle<()>,
    ) {
        assert!(!config.liveness_interval.is_zero(), "liveness interval must be positive");

        let (tx, rx) = mpsc::channel(RECONCILER_COMMAND_BUFFER_COUNT);
        let (events_tx, events_rx) = mpsc::channel(RECONCILER_COMMAND_BUFFER_COUNT);
        let (notify_tx, notify_rx) = mpsc::channel(RECONCILER_COMMAND_BUFFER_COUNT);
        source.subscribe(notify_tx);

        let reconciler = Self {
            config,
            io,
            index,
            shapes,
            source,
            bindings: HashMap::new(),
            liveness_busy: false,
            tx: tx.downgrade(),
            events_tx,
        };
        let task = tokio::spawn(reconciler.run(rx, notify_rx));

        (ReconcilerHandle { tx }, events_rx, task)
    }

    fn key(&self, shape_id: Uuid) -> ShapeKey {
        ShapeKey::new(self.config.owner_id, shape_id)
    }

    #[instrument(skip_all, fields(owner_id = %self.config.owner_id), level = "info")]
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut notifications: mpsc::Receiver<Uuid>,
    ) {
        let mut liveness = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.liveness_interval,
            self.config.liveness_interval,
        );
        liveness.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Reconciler started");

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    // Every handle is gone and no spawned call is pending
                    None => break,
                },
                Some(shape_id) = notifications.recv() => self.on_notification(shape_id),
                _ = liveness.tick() => self.on_liveness_tick(),
            }
        }

        info!("Reconciler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Create { reply } => self.begin_create(reply),
            Command::Restore { reply } => self.begin_restore(reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.bindings.clone());
            }
            Command::Activated {
                shape_id,
                result,
                reply,
            } => {
                let result = result.map(|shape| {
                    self.bind(shape_id, shape);
                    shape_id
                });
                let _ = reply.send(result);
            }
            Command::Restored { result, reply } => {
                let result = result.map(|checks| self.bind_restored(checks));
                let _ = reply.send(result);
            }
            Command::Refreshed { shape_id, result } => match result {
                Ok(shape) => self.update(shape_id, shape),
                // Only the liveness pass evicts
                Err(e) => debug!(shape_id = %shape_id, error = %format!("{:#}", e), "Refresh failed"),
            },
            Command::LivenessChecked { checks } => self.apply_liveness(checks),
            // Handled by the run loop
            Command::Shutdown { .. } => {}
        }
    }

    /// New id, activate through a position read, then bind
    fn begin_create(&mut self, reply: oneshot::Sender<Result<Uuid>>) {
        let shape_id = self.io.gen_uuid();
        let key = self.key(shape_id);
        let shapes = self.shapes.clone();
        let Some(tx) = self.tx.upgrade() else { return };
        debug!(shape_id = %shape_id, "Creating shape");

        tokio::spawn(async move {
            let result = shapes
                .get_current_position(key)
                .await
                .with_context(|| format!("failed to activate shape {}", shape_id));
            let _ = tx
                .send(Command::Activated {
                    shape_id,
                    result,
                    reply,
                })
                .await;
        });
    }

    /// List this owner's shapes and activate them all concurrently
    fn begin_restore(&mut self, reply: oneshot::Sender<Result<usize>>) {
        let owner_id = self.config.owner_id;
        let index = self.index.clone();
        let shapes = self.shapes.clone();
        let Some(tx) = self.tx.upgrade() else { return };

        tokio::spawn(async move {
            let result = match index
                .list_entities(owner_id)
                .await
                .context("failed to list entities")
            {
                Ok(ids) => Ok(check_all(shapes.as_ref(), owner_id, ids).await),
                Err(e) => Err(e),
            };
            let _ = tx.send(Command::Restored { result, reply }).await;
        });
    }

    fn bind_restored(&mut self, checks: Vec<PositionCheck>) -> usize {
        let mut bound = 0;
        for (shape_id, result) in checks {
            match result {
                Ok(shape) => {
                    self.bind(shape_id, shape);
                    bound += 1;
                }
                Err(reason) => warn!(shape_id = %shape_id, reason, "Failed to restore shape"),
            }
        }
        info!(bound, "Restored shapes");
        bound
    }

    fn on_notification(&mut self, shape_id: Uuid) {
        if !self.bindings.contains_key(&shape_id) {
            return;
        }

        let key = self.key(shape_id);
        let shapes = self.shapes.clone();
        let Some(tx) = self.tx.upgrade() else { return };
        tokio::spawn(async move {
            let result = shapes.get_current_position(key).await;
            let _ = tx.send(Command::Refreshed { shape_id, result }).await;
        });
    }

    fn on_liveness_tick(&mut self) {
        if self.liveness_busy {
            debug!("Previous liveness pass still running; skipping tick");
            return;
        }
        if self.bindings.is_empty() {
            return;
        }
        let Some(tx) = self.tx.upgrade() else { return };

        self.liveness_busy = true;
        let owner_id = self.config.owner_id;
        let ids: Vec<Uuid> = self.bindings.keys().copied().collect();
        let shapes = self.shapes.clone();
        tokio::spawn(async move {
            let checks = check_all(shapes.as_ref(), owner_id, ids).await;
            let _ = tx.send(Command::LivenessChecked { checks }).await;
        });
    }

    fn apply_liveness(&mut self, checks: Vec<PositionCheck>) {
        self.liveness_busy = false;
        for (shape_id, result) in checks {
            match result {
                Ok(shape) => self.update(shape_id, shape),
                Err(reason) => self.evict(shape_id, reason),
            }
        }
    }

    fn bind(&mut self, shape_id: Uuid, shape: Shape) {
        self.bindings.insert(shape_id, shape);
        self.emit(ReconcilerEvent::Bound { shape_id, shape });
    }

    /// Update a binding that still exists; late results for evicted shapes
    /// are dropped
    fn update(&mut self, shape_id: Uuid, shape: Shape) {
        if let Some(current) = self.bindings.get_mut(&shape_id) {
            *current = shape;
            self.emit(ReconcilerEvent::Updated { shape_id, shape });
        }
    }

    fn evict(&mut self, shape_id: Uuid, reason: String) {
        if self.bindings.remove(&shape_id).is_some() {
            warn!(shape_id = %shape_id, reason, "Shape unreachable; evicting");
            self.emit(ReconcilerEvent::Evicted { shape_id, reason });
        }
    }

    fn emit(&self, event: ReconcilerEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    warn!(?event, "Event receiver lagging; dropping event")
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }

    /// Unregister every bound reminder, then release the subscription
    async fn shutdown(&mut self) {
        info!(bound = self.bindings.len(), "Reconciler shutting down");

        let unregisters = self.bindings.keys().map(|shape_id| {
            let key = self.key(*shape_id);
            let shapes = self.shapes.clone();
            async move { (key, shapes.unregister_reminder(key).await) }
        });
        for (key, result) in join_all(unregisters).await {
            if let Err(e) = result {
                warn!(shape = %key, error = %format!("{:#}", e), "Failed to unregister reminder");
            }
        }
        self.bindings.clear();

        self.source.disconnect().await;
    }
}

/// Read every shape concurrently
async fn check_all(
    shapes: &dyn ShapeApi,
    owner_id: Uuid,
    ids: Vec<Uuid>,
) -> Vec<PositionCheck> {
    let reads = ids.into_iter().map(|shape_id| async move {
        let result = shapes
            .get_current_position(ShapeKey::new(owner_id, shape_id))
            .await
            .map_err(|e| format!("{:#}", e));
        (shape_id, result)
    });
    join_all(reads).await
}
