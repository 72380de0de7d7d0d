//! Actor activation and lifecycle management
//!
//! TigerStyle: Explicit lifecycle states, single activation guarantee.
//!
//! An `ActiveActor` is owned by exactly one task (see `dispatcher`), so every
//! turn (invocation or reminder firing) runs to completion before the next
//! starts. State is snapshotted before a turn and restored if the turn or
//! its persistence fails, so the in-memory state never runs ahead of storage.
//!
//! A turn commits in a fixed order: save the state (skipped when the turn
//! left it byte-for-byte unchanged), apply the reminder changes the turn
//! queued, then hand its queued events to the actor for delivery.

use crate::mailbox::{Envelope, MessageKind};
use bytes::Bytes;
use shoal_core::actor::{Actor, ActorContext, ActorId};
use shoal_core::constants::{ACTOR_INVOCATION_TIMEOUT_MS_MAX, ACTOR_STATE_SIZE_BYTES_MAX};
use shoal_core::error::{Error, Result};
use shoal_core::events::OutboundEvent;
use shoal_core::io::TimeProvider;
use shoal_core::reminder::ReminderRegistry;
use shoal_core::Runtime;
use shoal_storage::{ActorKV, ScopedKV};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// State key for actor's serialized state
const STATE_KEY: &[u8] = b"__state__";

/// Actor lifecycle state
///
/// - `Inactive`: Actor is not running (initial state, or after deactivation)
/// - `Activating`: Actor is loading state and running on_activate hook
/// - `Active`: Actor is running and accepting invocations
/// - `Deactivating`: Actor is persisting state and running on_deactivate hook
///
/// State transitions:
/// ```text
///                   +------------+
///                   |  Inactive  | <-----+
///                   +------------+       |
///                         |              |
///                         v              |
///                   +------------+       |
///                   | Activating | ------+  (activation failed)
///                   +------------+       |
///                         |              |
///                         v              |
///                   +------------+       |
///                   |   Active   |       |
///                   +------------+       |
///                         |              |
///                         v              |
///                   +-------------+      |
///                   | Deactivating| -----+
///                   +-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    Inactive,
    Activating,
    /// Invocations are only allowed in this state
    Active,
    Deactivating,
}

impl ActivationState {
    /// Check if actor can accept new invocations
    pub fn can_invoke(&self) -> bool {
        matches!(self, ActivationState::Active)
    }

    /// Check if the transition is part of the lifecycle
    pub fn can_transition_to(&self, next: ActivationState) -> bool {
        match (self, next) {
            (ActivationState::Inactive, ActivationState::Activating) => true,
            (ActivationState::Activating, ActivationState::Active) => true,
            (ActivationState::Activating, ActivationState::Inactive) => true,
            (ActivationState::Active, ActivationState::Deactivating) => true,
            (ActivationState::Deactivating, ActivationState::Inactive) => true,
            _ if *self == next => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Inactive => write!(f, "inactive"),
            ActivationState::Activating => write!(f, "activating"),
            ActivationState::Active => write!(f, "active"),
            ActivationState::Deactivating => write!(f, "deactivating"),
        }
    }
}

/// Statistics for an active actor
///
/// Uses monotonic timestamps (u64 ms) for DST compatibility.
#[derive(Debug, Clone, Default)]
pub struct ActivationStats {
    /// When the actor was activated (monotonic ms)
    pub activated_at_ms: u64,
    /// Last time the actor processed a message (monotonic ms)
    pub last_activity_at_ms: Option<u64>,
    /// Invocations processed
    pub invocation_count: u64,
    /// Reminder firings processed
    pub reminder_count: u64,
    /// Turns that returned an error
    pub error_count: u64,
    /// Total time spent processing in ms
    pub total_processing_time_ms: u64,
}

impl ActivationStats {
    /// Create new stats stamped with the activation time
    pub fn with_time(time: &dyn TimeProvider) -> Self {
        Self {
            activated_at_ms: time.monotonic_ms(),
            ..Default::default()
        }
    }

    fn record(&mut self, kind: &MessageKind, duration_ms: u64, is_error: bool, now_ms: u64) {
        self.last_activity_at_ms = Some(now_ms);
        match kind {
            MessageKind::Invoke { .. } => self.invocation_count = self.invocation_count.wrapping_add(1),
            MessageKind::Reminder { .. } => self.reminder_count = self.reminder_count.wrapping_add(1),
        }
        self.total_processing_time_ms = self.total_processing_time_ms.saturating_add(duration_ms);
        if is_error {
            self.error_count = self.error_count.wrapping_add(1);
        }
    }

    /// Time since last activity, or since activation if idle from the start
    pub fn idle_time_ms(&self, time: &dyn TimeProvider) -> u64 {
        let since = self.last_activity_at_ms.unwrap_or(self.activated_at_ms);
        time.monotonic_ms().saturating_sub(since)
    }

    /// Turns processed so far
    pub fn turn_count(&self) -> u64 {
        self.invocation_count.saturating_add(self.reminder_count)
    }
}

/// An active actor instance
///
/// TigerStyle: Single activation guarantee - only one ActiveActor per ActorId
/// exists at any time.
pub struct ActiveActor<A: Actor> {
    /// The actor's unique identifier
    pub id: ActorId,
    /// The actor implementation
    actor: A,
    /// The actor's context (state + reminder access)
    context: ActorContext<A::State>,
    /// Current lifecycle state
    state: ActivationState,
    /// Statistics
    stats: ActivationStats,
    /// Deadline for a single turn
    invocation_timeout: Duration,
    /// Scoped KV store for persistence (bound to this actor)
    kv: ScopedKV,
    /// Encoded state as last read from or written to storage
    persisted: Option<Vec<u8>>,
    /// Time provider for DST compatibility
    time: Arc<dyn TimeProvider>,
}

impl<A: Actor> ActiveActor<A> {
    /// Activate an actor
    ///
    /// Loads state, runs `on_activate`, then persists whatever state the hook
    /// left. A storage read failure fails the activation rather than starting
    /// from default state, which would overwrite the stored record.
    #[instrument(skip(actor, kv, reminders, time), fields(actor_id = %id), level = "info")]
    pub async fn activate(
        id: ActorId,
        actor: A,
        kv: Arc<dyn ActorKV>,
        reminders: Arc<dyn ReminderRegistry>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        debug!(actor_id = %id, "Activating actor");

        let mut active = Self {
            id: id.clone(),
            actor,
            context: ActorContext::new(id.clone(), A::State::default(), reminders),
            state: ActivationState::Activating,
            stats: ActivationStats::with_time(time.as_ref()),
            invocation_timeout: Duration::from_millis(ACTOR_INVOCATION_TIMEOUT_MS_MAX),
            kv: ScopedKV::new(id, kv),
            persisted: None,
            time,
        };

        let activated = async {
            active.load_state().await?;
            active.actor.on_activate(&mut active.context).await?;
            active.save_state().await?;
            active.context.commit().await
        }
        .await;

        let events = match activated {
            Ok(events) => events,
            Err(e) => {
                error!(actor_id = %active.id, error = %e, "Activation failed");
                active.context.discard();
                active.state = ActivationState::Inactive;
                return Err(Error::ActorActivationFailed {
                    id: active.id.qualified_name(),
                    reason: e.to_string(),
                });
            }
        };

        debug_assert!(active.state.can_transition_to(ActivationState::Active));
        active.state = ActivationState::Active;
        info!(actor_id = %active.id, "Actor activated");
        active.deliver(events).await;

        Ok(active)
    }

    /// Load state from storage; absent state leaves the default in place
    async fn load_state(&mut self) -> Result<()> {
        match self.kv.get(STATE_KEY).await? {
            Some(bytes) => {
                self.context.state =
                    serde_json::from_slice(&bytes).map_err(|e| Error::DeserializationFailed {
                        reason: format!("actor state: {}", e),
                    })?;
                self.persisted = Some(bytes.to_vec());
                debug!(actor_id = %self.id, "Loaded state from storage");
            }
            None => {
                debug!(actor_id = %self.id, "No existing state, using default");
            }
        }
        Ok(())
    }

    /// Save state to storage unless storage already holds exactly this state
    async fn save_state(&mut self) -> Result<()> {
        let bytes =
            serde_json::to_vec(&self.context.state).map_err(|e| Error::SerializationFailed {
                reason: format!("actor state: {}", e),
            })?;

        if bytes.len() > ACTOR_STATE_SIZE_BYTES_MAX {
            return Err(Error::ActorStateTooLarge {
                size: bytes.len(),
                limit: ACTOR_STATE_SIZE_BYTES_MAX,
            });
        }

        if self.persisted.as_deref() == Some(bytes.as_slice()) {
            return Ok(());
        }
        self.kv.set(STATE_KEY, &bytes).await?;
        self.persisted = Some(bytes);
        Ok(())
    }

    /// Hand a committed turn's events to the actor
    async fn deliver(&self, events: Vec<OutboundEvent>) {
        if !events.is_empty() {
            self.actor.publish_committed(&self.id, events).await;
        }
    }

    /// Run one mailbox message and reply to its sender
    pub async fn handle(&mut self, envelope: Envelope) {
        let Envelope { kind, reply_tx, .. } = envelope;

        let result = match &kind {
            MessageKind::Invoke { operation, payload } => {
                self.process_invocation(operation, payload.clone()).await
            }
            MessageKind::Reminder { name } => {
                self.process_reminder(name).await.map(|()| Bytes::new())
            }
        };

        let _ = reply_tx.send(result);
    }

    /// Process an invocation
    ///
    /// State changes are persisted only if the actor returns Ok.
    #[instrument(skip(self, payload), fields(actor_id = %self.id), level = "debug")]
    pub async fn process_invocation(&mut self, operation: &str, payload: Bytes) -> Result<Bytes> {
        assert!(
            self.state.can_invoke(),
            "cannot invoke when state = {}",
            self.state
        );
        assert!(!operation.is_empty(), "operation cannot be empty");

        let start_ms = self.time.monotonic_ms();
        let snapshot = self.context.state.clone();

        let outcome = match shoal_core::current_runtime()
            .timeout(
                self.invocation_timeout,
                self.actor.invoke(&mut self.context, operation, payload),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(self.timeout_error(operation)),
        };

        let kind = MessageKind::Invoke {
            operation: operation.to_string(),
            payload: Bytes::new(),
        };
        self.finish_turn(&kind, snapshot, outcome, start_ms).await
    }

    /// Process a reminder firing
    #[instrument(skip(self), fields(actor_id = %self.id), level = "debug")]
    pub async fn process_reminder(&mut self, name: &str) -> Result<()> {
        assert!(
            self.state.can_invoke(),
            "cannot fire reminder when state = {}",
            self.state
        );

        let start_ms = self.time.monotonic_ms();
        let snapshot = self.context.state.clone();

        let outcome = match shoal_core::current_runtime()
            .timeout(
                self.invocation_timeout,
                self.actor.receive_reminder(&mut self.context, name),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(self.timeout_error(name)),
        };

        let kind = MessageKind::Reminder {
            name: name.to_string(),
        };
        self.finish_turn(&kind, snapshot, outcome, start_ms).await
    }

    /// Commit a successful turn, or roll back a failed one
    ///
    /// If the reminder changes fail after the state was saved, the state is
    /// kept (storage already has it) but the turn still reports the error and
    /// its events are dropped.
    async fn finish_turn<T>(
        &mut self,
        kind: &MessageKind,
        snapshot: A::State,
        outcome: Result<T>,
        start_ms: u64,
    ) -> Result<T> {
        let result = match outcome {
            Ok(value) => match self.save_state().await {
                Ok(()) => match self.context.commit().await {
                    Ok(events) => {
                        self.deliver(events).await;
                        Ok(value)
                    }
                    Err(e) => {
                        error!(
                            actor_id = %self.id,
                            operation = kind.label(),
                            error = %e,
                            "Failed to apply reminder changes"
                        );
                        Err(e)
                    }
                },
                Err(e) => {
                    self.context.state = snapshot;
                    self.context.discard();
                    error!(
                        actor_id = %self.id,
                        operation = kind.label(),
                        error = %e,
                        "Failed to persist state, state rolled back"
                    );
                    Err(e)
                }
            },
            Err(e) => {
                self.context.state = snapshot;
                self.context.discard();
                debug!(
                    actor_id = %self.id,
                    operation = kind.label(),
                    error = %e,
                    "Turn failed, state rolled back"
                );
                Err(e)
            }
        };

        let now_ms = self.time.monotonic_ms();
        self.stats
            .record(kind, now_ms.saturating_sub(start_ms), result.is_err(), now_ms);

        result
    }

    fn timeout_error(&self, operation: &str) -> Error {
        Error::ActorInvocationTimeout {
            id: self.id.qualified_name(),
            operation: operation.to_string(),
            timeout_ms: self.invocation_timeout.as_millis() as u64,
        }
    }

    /// Deactivate the actor
    ///
    /// Runs `on_deactivate` and persists state. Hook and storage failures are
    /// logged; the actor ends up Inactive regardless.
    #[instrument(skip(self), fields(actor_id = %self.id), level = "info")]
    pub async fn deactivate(&mut self) {
        if self.state == ActivationState::Inactive {
            return;
        }

        assert!(
            self.state.can_transition_to(ActivationState::Deactivating),
            "Invalid state transition: {} -> Deactivating",
            self.state
        );
        self.state = ActivationState::Deactivating;

        if let Err(e) = self.actor.on_deactivate(&mut self.context).await {
            error!(actor_id = %self.id, error = %e, "on_deactivate failed");
        }

        match self.save_state().await {
            Ok(()) => match self.context.commit().await {
                Ok(events) => self.deliver(events).await,
                Err(e) => {
                    error!(
                        actor_id = %self.id,
                        error = %e,
                        "Failed to apply reminder changes during deactivation"
                    );
                }
            },
            Err(e) => {
                self.context.discard();
                error!(
                    actor_id = %self.id,
                    error = %e,
                    "Failed to save state during deactivation"
                );
            }
        }

        self.state = ActivationState::Inactive;

        info!(
            actor_id = %self.id,
            invocations = self.stats.invocation_count,
            reminders = self.stats.reminder_count,
            errors = self.stats.error_count,
            "Actor deactivated"
        );
    }

    /// Get the current activation state
    pub fn activation_state(&self) -> ActivationState {
        self.state
    }

    /// Get the actor's statistics
    pub fn stats(&self) -> &ActivationStats {
        &self.stats
    }

    /// The in-memory state
    pub fn state(&self) -> &A::State {
        &self.context.state
    }

    /// Set the per-turn deadline
    pub fn set_invocation_timeout(&mut self, timeout: Duration) {
        debug_assert!(timeout.as_millis() <= ACTOR_INVOCATION_TIMEOUT_MS_MAX as u128);
        debug_assert!(!timeout.is_zero());
        self.invocation_timeout = timeout;
    }
}
