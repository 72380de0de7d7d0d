//! Actor identity, behaviour and per-turn context

use crate::constants::*;
use crate::error::{Error, Result};
use crate::events::{OutboundEvent, ShapeEvent};
use crate::reminder::{NoOpReminders, Reminder, ReminderRegistry};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Address of a virtual actor
///
/// `namespace:id`. The pair is the unit of placement: at most one activation
/// exists per `ActorId` at any time.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorId {
    namespace: String,
    id: String,
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl ActorId {
    /// Validated id
    ///
    /// Both parts must be non-empty, within their length limits, and made of
    /// ASCII alphanumerics, `-`, `_` and `.` only.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let id = id.into();
        let invalid = |reason: String| Error::InvalidActorId {
            id: format!("{}:{}", namespace, id),
            reason,
        };

        if namespace.is_empty() || id.is_empty() {
            return Err(invalid("namespace and id must not be empty".into()));
        }
        if namespace.len() > ACTOR_NAMESPACE_LENGTH_BYTES_MAX {
            return Err(invalid(format!(
                "namespace is {} bytes, limit is {}",
                namespace.len(),
                ACTOR_NAMESPACE_LENGTH_BYTES_MAX
            )));
        }
        if id.len() > ACTOR_ID_LENGTH_BYTES_MAX {
            return Err(Error::ActorIdTooLong {
                length: id.len(),
                limit: ACTOR_ID_LENGTH_BYTES_MAX,
            });
        }
        if let Some(bad) = namespace.chars().chain(id.chars()).find(|c| !is_id_char(*c)) {
            return Err(invalid(format!("character {:?} is not allowed", bad)));
        }

        Ok(Self { namespace, id })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `namespace:id`, the form used as a storage and routing key
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }

    /// Inverse of [`ActorId::qualified_name`]
    pub fn parse(qualified: &str) -> Result<Self> {
        let (namespace, id) = qualified.split_once(':').ok_or_else(|| Error::InvalidActorId {
            id: qualified.to_string(),
            reason: "expected namespace:id".into(),
        })?;
        Self::new(namespace, id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// Behaviour of one kind of virtual actor
///
/// The runtime never runs two turns of the same activation at once: an
/// invocation and a reminder firing on one actor are always serialized.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
    /// Persisted between turns; a fresh actor starts from `Default`
    type State: Serialize + DeserializeOwned + Default + Clone + Send + Sync;

    /// One request turn
    ///
    /// State changes made by a turn that returns an error are discarded.
    async fn invoke(
        &self,
        ctx: &mut ActorContext<Self::State>,
        operation: &str,
        payload: Bytes,
    ) -> Result<Bytes>;

    /// A reminder of this actor came due
    async fn receive_reminder(
        &self,
        _ctx: &mut ActorContext<Self::State>,
        _name: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after state is loaded; state left in the context is saved before
    /// the first request, and activation fails if that save fails.
    async fn on_activate(&self, _ctx: &mut ActorContext<Self::State>) -> Result<()> {
        Ok(())
    }

    async fn on_deactivate(&self, _ctx: &mut ActorContext<Self::State>) -> Result<()> {
        Ok(())
    }

    /// Deliver the events a committed turn queued with [`ActorContext::publish`]
    ///
    /// Called once the turn's state is saved and its reminder changes are
    /// applied. The turn has already succeeded, so delivery failures are the
    /// actor's to log. Actors that never publish can keep the default.
    async fn publish_committed(&self, _id: &ActorId, _events: Vec<OutboundEvent>) {}
}

enum ReminderChange {
    Register(Reminder),
    Unregister(String),
}

/// Context handed to an actor on every turn
///
/// Reminder changes and published events are queued, not applied. The
/// runtime commits them after the turn's state is saved and drops them if
/// the turn fails or its state cannot be saved.
pub struct ActorContext<S> {
    pub id: ActorId,
    pub state: S,
    reminders: Arc<dyn ReminderRegistry>,
    reminder_changes: Vec<ReminderChange>,
    outbox: Vec<OutboundEvent>,
}

impl<S> ActorContext<S> {
    pub fn new(id: ActorId, state: S, reminders: Arc<dyn ReminderRegistry>) -> Self {
        Self {
            id,
            state,
            reminders,
            reminder_changes: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Register (or overwrite) a periodic reminder once this turn commits
    ///
    /// The schedule is validated immediately.
    pub fn register_reminder(
        &mut self,
        name: &str,
        due_time_ms: u64,
        period_ms: u64,
    ) -> Result<()> {
        let reminder = Reminder::new(self.id.clone(), name, due_time_ms, period_ms)?;
        self.reminder_changes.push(ReminderChange::Register(reminder));
        Ok(())
    }

    /// Remove a reminder once this turn commits; absent reminders are ignored
    pub fn unregister_reminder(&mut self, name: &str) {
        self.reminder_changes
            .push(ReminderChange::Unregister(name.to_string()));
    }

    /// Queue `event` on `topic` for delivery after this turn commits
    pub fn publish(&mut self, topic: &str, event: ShapeEvent) {
        self.outbox.push(OutboundEvent::new(topic, event));
    }

    /// Events queued so far in this turn
    pub fn outbox(&self) -> &[OutboundEvent] {
        &self.outbox
    }

    /// Apply queued reminder changes in order and hand back the queued events
    ///
    /// Stops at the first registry failure; the events of a turn whose
    /// reminder changes failed are dropped.
    pub async fn commit(&mut self) -> Result<Vec<OutboundEvent>> {
        let events = std::mem::take(&mut self.outbox);
        for change in std::mem::take(&mut self.reminder_changes) {
            match change {
                ReminderChange::Register(reminder) => self.reminders.register(reminder).await?,
                ReminderChange::Unregister(name) => {
                    self.reminders.unregister(&self.id, &name).await?
                }
            }
        }
        Ok(events)
    }

    /// Drop everything queued by a failed turn
    pub fn discard(&mut self) {
        self.reminder_changes.clear();
        self.outbox.clear();
    }
}

impl<S: Default> ActorContext<S> {
    /// Context with default state and no reminder backend
    pub fn detached(id: ActorId) -> Self {
        Self::new(id, S::default(), Arc::new(NoOpReminders))
    }
}
