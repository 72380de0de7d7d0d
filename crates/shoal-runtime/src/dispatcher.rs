//! Message dispatcher for actor runtime
//!
//! TigerStyle: Single-threaded per-actor execution, explicit message routing.
//!
//! The dispatcher loop owns the table of activations. Each activated actor
//! runs in its own task that owns the `ActiveActor` and drains a bounded
//! channel, so turns of one actor are strictly sequential while different
//! actors run in parallel.
//!
//! ```text
//!   handles --Deliver--> dispatcher --try_send--> actor task (one per id)
//!                            ^                        |
//!                            +----Idle / Stopped------+
//! ```
//!
//! An id is in at most one slot. While an activation is winding down its
//! slot is `Deactivating` and new messages queue in a bounded mailbox; the
//! next activation starts only after the old task reports `Stopped`.

use crate::activation::ActiveActor;
use crate::mailbox::{Envelope, Mailbox, MessageKind};
use crate::reminder::ReminderSink;
use async_trait::async_trait;
use bytes::Bytes;
use shoal_core::actor::{Actor, ActorId};
use shoal_core::config::ActorConfig;
use shoal_core::constants::{
    ACTOR_CONCURRENT_COUNT_MAX, ACTOR_IDLE_TIMEOUT_MS_DEFAULT, ACTOR_INVOCATION_TIMEOUT_MS_MAX,
    DISPATCHER_COMMAND_BUFFER_COUNT, MAILBOX_DEPTH_DEFAULT,
};
use shoal_core::error::{Error, Result};
use shoal_core::io::{TimeProvider, WallClockTime};
use shoal_core::reminder::ReminderRegistry;
use shoal_storage::ActorKV;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Dispatcher Config
// ============================================================================

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of concurrent activations
    pub max_actors: usize,
    /// Maximum queued messages per actor
    pub mailbox_depth: usize,
    /// Channel buffer size for dispatcher commands
    pub command_buffer_size: usize,
    /// Deactivate an actor after this long without messages
    pub idle_timeout: Duration,
    /// Deadline for a single turn
    pub invocation_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_actors: ACTOR_CONCURRENT_COUNT_MAX,
            mailbox_depth: MAILBOX_DEPTH_DEFAULT,
            command_buffer_size: DISPATCHER_COMMAND_BUFFER_COUNT,
            idle_timeout: Duration::from_millis(ACTOR_IDLE_TIMEOUT_MS_DEFAULT),
            invocation_timeout: Duration::from_millis(ACTOR_INVOCATION_TIMEOUT_MS_MAX),
        }
    }
}

impl From<&ActorConfig> for DispatcherConfig {
    fn from(config: &ActorConfig) -> Self {
        Self {
            max_actors: config.max_actors_count,
            mailbox_depth: config.mailbox_depth_max,
            command_buffer_size: DISPATCHER_COMMAND_BUFFER_COUNT,
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            invocation_timeout: Duration::from_millis(config.invocation_timeout_ms),
        }
    }
}

/// Commands sent to the dispatcher
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Route a message to an actor, activating it if needed
    Deliver { actor_id: ActorId, envelope: Envelope },
    /// Deactivate an actor
    Deactivate { actor_id: ActorId },
    /// Shutdown the dispatcher
    Shutdown,
}

/// Reports from actor tasks back to the dispatcher
#[derive(Debug)]
enum LifecycleEvent {
    /// No message arrived within the idle timeout
    Idle { actor_id: ActorId },
    /// The task has deactivated (or failed to activate) and exited
    Stopped { actor_id: ActorId },
}

// ============================================================================
// Dispatcher Handle
// ============================================================================

/// Handle to send commands to the dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    command_tx: mpsc::Sender<DispatcherCommand>,
    active_count: Arc<AtomicUsize>,
    time: Arc<dyn TimeProvider>,
}

impl DispatcherHandle {
    /// Invoke an operation on an actor
    pub async fn invoke(
        &self,
        actor_id: ActorId,
        operation: String,
        payload: Bytes,
    ) -> Result<Bytes> {
        self.send_envelope(actor_id, MessageKind::Invoke { operation, payload })
            .await
    }

    /// Deliver a reminder firing and wait for the actor to process it
    pub async fn fire_reminder(&self, actor_id: ActorId, name: String) -> Result<()> {
        self.send_envelope(actor_id, MessageKind::Reminder { name })
            .await
            .map(|_| ())
    }

    async fn send_envelope(&self, actor_id: ActorId, kind: MessageKind) -> Result<Bytes> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope::new(kind, reply_tx, self.time.as_ref());

        self.command_tx
            .send(DispatcherCommand::Deliver { actor_id, envelope })
            .await
            .map_err(|_| Error::internal("dispatcher channel closed"))?;

        reply_rx
            .await
            .map_err(|_| Error::internal("reply channel closed"))?
    }

    /// Deactivate an actor
    ///
    /// Returns once the request is queued; the actor finishes its current
    /// messages first. The next message reactivates it.
    pub async fn deactivate(&self, actor_id: ActorId) -> Result<()> {
        self.command_tx
            .send(DispatcherCommand::Deactivate { actor_id })
            .await
            .map_err(|_| Error::internal("dispatcher channel closed"))
    }

    /// Shutdown the dispatcher
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(DispatcherCommand::Shutdown)
            .await
            .map_err(|_| Error::internal("dispatcher channel closed"))
    }

    /// Request shutdown without waiting for channel capacity
    ///
    /// Returns false if the request could not be queued.
    pub fn try_shutdown(&self) -> bool {
        self.command_tx.try_send(DispatcherCommand::Shutdown).is_ok()
    }

    /// Activations currently held, including ones winding down
    pub fn active_actor_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReminderSink for DispatcherHandle {
    async fn deliver(&self, actor_id: &ActorId, name: &str) -> Result<()> {
        self.fire_reminder(actor_id.clone(), name.to_string()).await
    }
}

// ============================================================================
// Actor Factory
// ============================================================================

/// Factory for creating actors
pub trait ActorFactory<A>: Send + Sync + 'static
where
    A: Actor,
{
    /// Create a new actor instance
    fn create(&self, id: &ActorId) -> A;
}

/// Simple factory that clones a prototype actor
pub struct CloneFactory<A: Clone + Send + Sync + 'static> {
    prototype: A,
}

impl<A: Clone + Send + Sync + 'static> CloneFactory<A> {
    /// Create a new clone factory
    pub fn new(prototype: A) -> Self {
        Self { prototype }
    }
}

impl<A> ActorFactory<A> for CloneFactory<A>
where
    A: Actor + Clone,
{
    fn create(&self, _id: &ActorId) -> A {
        self.prototype.clone()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

enum Slot {
    /// A task is running; messages go straight to its channel
    Active { tx: mpsc::Sender<Envelope> },
    /// The task is winding down; messages wait for the next activation
    Deactivating { pending: Mailbox },
}

/// Dispatcher for routing messages to actors
///
/// Manages actor lifecycle and message routing.
pub struct Dispatcher<A, R>
where
    A: Actor,
    R: shoal_core::Runtime,
{
    /// Actor factory
    factory: Arc<dyn ActorFactory<A>>,
    /// KV store for persistence
    kv: Arc<dyn ActorKV>,
    /// Reminder registry handed to every actor context
    reminders: Arc<dyn ReminderRegistry>,
    /// Time provider for DST compatibility
    time: Arc<dyn TimeProvider>,
    /// Configuration
    config: DispatcherConfig,
    /// Runtime for spawning tasks
    runtime: R,
    /// Activation table
    slots: HashMap<ActorId, Slot>,
    /// Command receiver
    command_rx: mpsc::Receiver<DispatcherCommand>,
    /// Command sender (for creating handles)
    command_tx: mpsc::Sender<DispatcherCommand>,
    lifecycle_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleEvent>,
    /// Slot count (shared with handles)
    active_count: Arc<AtomicUsize>,
}

impl<A, R> Dispatcher<A, R>
where
    A: Actor,
    R: shoal_core::Runtime,
{
    /// Create a new dispatcher
    pub fn new(
        factory: Arc<dyn ActorFactory<A>>,
        kv: Arc<dyn ActorKV>,
        reminders: Arc<dyn ReminderRegistry>,
        config: DispatcherConfig,
        runtime: R,
    ) -> Self {
        assert!(config.max_actors > 0, "max_actors must be positive");
        assert!(config.mailbox_depth > 0, "mailbox_depth must be positive");

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();

        Self {
            factory,
            kv,
            reminders,
            time: Arc::new(WallClockTime),
            config,
            runtime,
            slots: HashMap::new(),
            command_rx,
            command_tx,
            lifecycle_rx,
            lifecycle_tx,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use a custom time provider (for DST)
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }

    /// Get a handle to the dispatcher
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            command_tx: self.command_tx.clone(),
            active_count: self.active_count.clone(),
            time: self.time.clone(),
        }
    }

    /// Run the dispatcher loop until shutdown
    #[instrument(skip(self), level = "info")]
    pub async fn run(&mut self) {
        info!("Dispatcher starting");

        loop {
            tokio::select! {
                biased;
                Some(event) = self.lifecycle_rx.recv() => self.handle_lifecycle(event),
                command = self.command_rx.recv() => match command {
                    Some(DispatcherCommand::Deliver { actor_id, envelope }) => {
                        self.handle_deliver(actor_id, envelope);
                    }
                    Some(DispatcherCommand::Deactivate { actor_id }) => {
                        self.begin_deactivate(&actor_id);
                    }
                    Some(DispatcherCommand::Shutdown) | None => {
                        info!("Dispatcher shutting down");
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }

        info!("Dispatcher stopped");
    }

    fn handle_deliver(&mut self, actor_id: ActorId, envelope: Envelope) {
        let depth = self.config.mailbox_depth;

        match self.slots.get_mut(&actor_id) {
            Some(slot) => match slot {
                Slot::Active { tx } => match tx.try_send(envelope) {
                    Ok(()) => {}
                    Err(TrySendError::Full(envelope)) => {
                        envelope.reply(Err(mailbox_full(&actor_id, depth)));
                    }
                    Err(TrySendError::Closed(envelope)) => {
                        // The task closed its channel after a failed
                        // activation; retry once it has stopped
                        let mut pending = Mailbox::with_capacity(depth);
                        if let Err(full) = pending.push(envelope) {
                            full.envelope.reply(Err(mailbox_full(&actor_id, depth)));
                        }
                        *slot = Slot::Deactivating { pending };
                    }
                },
                Slot::Deactivating { pending } => {
                    if let Err(full) = pending.push(envelope) {
                        full.envelope.reply(Err(mailbox_full(&actor_id, depth)));
                    }
                }
            },
            None => {
                if self.slots.len() >= self.config.max_actors {
                    warn!(actor_id = %actor_id, "Actor limit reached");
                    envelope.reply(Err(Error::ActorLimitReached {
                        count: self.slots.len(),
                        max: self.config.max_actors,
                    }));
                    return;
                }
                self.activate(actor_id, vec![envelope]);
            }
        }
    }

    /// Spawn a task for `actor_id` and hand it the initial messages
    fn activate(&mut self, actor_id: ActorId, initial: Vec<Envelope>) {
        debug_assert!(!self.slots.contains_key(&actor_id), "actor already has a slot");

        let (tx, rx) = mpsc::channel(self.config.mailbox_depth);
        for envelope in initial {
            if let Err(TrySendError::Full(envelope) | TrySendError::Closed(envelope)) =
                tx.try_send(envelope)
            {
                envelope.reply(Err(mailbox_full(&actor_id, self.config.mailbox_depth)));
            }
        }

        let task = ActorTask {
            actor_id: actor_id.clone(),
            actor: self.factory.create(&actor_id),
            kv: self.kv.clone(),
            reminders: self.reminders.clone(),
            time: self.time.clone(),
            runtime: self.runtime.clone(),
            idle_timeout: self.config.idle_timeout,
            invocation_timeout: self.config.invocation_timeout,
            mailbox: rx,
            lifecycle_tx: self.lifecycle_tx.clone(),
        };
        // Detached; the task reports its exit through `Stopped`
        drop(self.runtime.spawn(task.run()));

        debug!(actor_id = %actor_id, "Activation spawned");
        self.slots.insert(actor_id, Slot::Active { tx });
        self.update_count();
    }

    /// Close an actor's channel; the task drains it and deactivates
    fn begin_deactivate(&mut self, actor_id: &ActorId) {
        if let Some(slot) = self.slots.get_mut(actor_id) {
            if matches!(slot, Slot::Active { .. }) {
                debug!(actor_id = %actor_id, "Deactivation requested");
                *slot = Slot::Deactivating {
                    pending: Mailbox::with_capacity(self.config.mailbox_depth),
                };
            }
        }
    }

    fn handle_lifecycle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Idle { actor_id } => {
                debug!(actor_id = %actor_id, "Actor idle");
                self.begin_deactivate(&actor_id);
            }
            LifecycleEvent::Stopped { actor_id } => {
                let pending = match self.slots.remove(&actor_id) {
                    Some(Slot::Deactivating { mut pending }) => pending.drain(),
                    _ => Vec::new(),
                };
                self.update_count();

                if !pending.is_empty() {
                    debug!(actor_id = %actor_id, pending = pending.len(), "Reactivating");
                    self.activate(actor_id, pending);
                }
            }
        }
    }

    /// Deactivate every actor and wait for all tasks to stop
    async fn shutdown(&mut self) {
        for (actor_id, slot) in self.slots.iter_mut() {
            if let Slot::Deactivating { pending } = slot {
                pending.reject_all(|| Error::ActorDeactivated {
                    id: actor_id.qualified_name(),
                });
            }
            *slot = Slot::Deactivating {
                pending: Mailbox::with_capacity(self.config.mailbox_depth),
            };
        }

        while !self.slots.is_empty() {
            match self.lifecycle_rx.recv().await {
                Some(LifecycleEvent::Stopped { actor_id }) => {
                    self.slots.remove(&actor_id);
                }
                Some(LifecycleEvent::Idle { .. }) => {}
                None => break,
            }
        }

        self.update_count();
    }

    fn update_count(&self) {
        self.active_count.store(self.slots.len(), Ordering::SeqCst);
    }
}

fn mailbox_full(actor_id: &ActorId, depth: usize) -> Error {
    Error::ActorMailboxFull {
        id: actor_id.qualified_name(),
        depth,
        max: depth,
    }
}

// ============================================================================
// Actor Task
// ============================================================================

/// Everything one activation's task owns
struct ActorTask<A: Actor, R: shoal_core::Runtime> {
    actor_id: ActorId,
    actor: A,
    kv: Arc<dyn ActorKV>,
    reminders: Arc<dyn ReminderRegistry>,
    time: Arc<dyn TimeProvider>,
    runtime: R,
    idle_timeout: Duration,
    invocation_timeout: Duration,
    mailbox: mpsc::Receiver<Envelope>,
    lifecycle_tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl<A: Actor, R: shoal_core::Runtime> ActorTask<A, R> {
    async fn run(self) {
        let ActorTask {
            actor_id,
            actor,
            kv,
            reminders,
            time,
            runtime,
            idle_timeout,
            invocation_timeout,
            mut mailbox,
            lifecycle_tx,
        } = self;

        let mut active = match ActiveActor::activate(actor_id.clone(), actor, kv, reminders, time)
            .await
        {
            Ok(active) => active,
            Err(e) => {
                // Fail what is already queued; later messages retry activation
                mailbox.close();
                let reason = match &e {
                    Error::ActorActivationFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                while let Some(envelope) = mailbox.recv().await {
                    envelope.reply(Err(Error::ActorActivationFailed {
                        id: actor_id.qualified_name(),
                        reason: reason.clone(),
                    }));
                }
                let _ = lifecycle_tx.send(LifecycleEvent::Stopped { actor_id });
                return;
            }
        };
        active.set_invocation_timeout(invocation_timeout);

        let mut idle_reported = false;
        loop {
            let next = if idle_reported {
                mailbox.recv().await
            } else {
                match runtime.timeout(idle_timeout, mailbox.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        idle_reported = true;
                        let _ = lifecycle_tx.send(LifecycleEvent::Idle {
                            actor_id: actor_id.clone(),
                        });
                        continue;
                    }
                }
            };

            match next {
                Some(envelope) => {
                    idle_reported = false;
                    active.handle(envelope).await;
                }
                None => break,
            }
        }

        active.deactivate().await;
        let _ = lifecycle_tx.send(LifecycleEvent::Stopped { actor_id });
    }
}
