//! Server state shared by the HTTP handlers
//!
//! TigerStyle: Cheap to clone, no locks; every field is itself a handle.

use crate::service::{IndexService, Relay};
use shoal_core::{Result, ShapeKey};
use shoal_runtime::{ActorHandle, ActorHandleBuilder, DispatcherHandle, ReminderService};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Server-wide shared state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    actors: ActorHandleBuilder,
    dispatcher: DispatcherHandle,
    reminders: ReminderService,
    index: IndexService,
    relay: Relay,
    /// Interval between SSE keep-alive comments
    keep_alive: Duration,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl AppState {
    pub fn new(
        dispatcher: DispatcherHandle,
        reminders: ReminderService,
        index: IndexService,
        relay: Relay,
        keep_alive: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                actors: ActorHandleBuilder::new(dispatcher.clone()),
                dispatcher,
                reminders,
                index,
                relay,
                keep_alive,
                start_time: Instant::now(),
            }),
        }
    }

    /// Handle to the actor owning `key`
    pub fn shape(&self, key: ShapeKey) -> Result<ActorHandle> {
        Ok(self.inner.actors.for_actor(key.actor_id()?))
    }

    pub fn index(&self) -> &IndexService {
        &self.inner.index
    }

    pub fn relay(&self) -> &Relay {
        &self.inner.relay
    }

    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn active_actor_count(&self) -> usize {
        self.inner.dispatcher.active_actor_count()
    }

    pub fn reminder_count(&self) -> usize {
        self.inner.reminders.scheduled_count()
    }
}
