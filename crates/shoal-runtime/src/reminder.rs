//! Durable reminder service
//!
//! TigerStyle: Registrations are storage records; timers are disposable.
//!
//! Every registration is written to the KV store under a reserved system
//! actor before its timer starts. Timers live only in this process: on start
//! the service reloads all records and re-arms them, so reminders outlive the
//! process (and the actor activation) that registered them.
//!
//! Firings are delivered through a [`ReminderSink`], normally the dispatcher,
//! which activates the target actor if needed. Delivery is at-least-once per
//! period; a failed delivery is logged and the next period fires as usual.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use shoal_core::actor::ActorId;
use shoal_core::constants::REMINDER_DELIVERY_TIMEOUT_MS_MAX;
use shoal_core::error::{Error, Result};
use shoal_core::reminder::{Reminder, ReminderKey, ReminderRegistry};
use shoal_storage::{ActorKV, ScopedKV};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Namespace of the reserved actor that owns reminder records
pub const REMINDER_STORE_NAMESPACE: &str = "system";

/// Id of the reserved actor that owns reminder records
pub const REMINDER_STORE_ID: &str = "reminders";

/// Destination for reminder firings
#[async_trait]
pub trait ReminderSink: Send + Sync {
    /// Deliver one firing to the actor and wait for it to be processed
    async fn deliver(&self, actor_id: &ActorId, name: &str) -> Result<()>;
}

/// Cancels its timer when dropped
struct TimerHandle {
    _cancel: oneshot::Sender<()>,
}

type SharedSink = Arc<OnceCell<Arc<dyn ReminderSink>>>;

struct ServiceInner {
    store: ScopedKV,
    sink: SharedSink,
    timers: Mutex<HashMap<ReminderKey, TimerHandle>>,
    delivery_timeout: Duration,
}

/// Durable, KV-backed reminder scheduler
#[derive(Clone)]
pub struct ReminderService {
    inner: Arc<ServiceInner>,
}

impl ReminderService {
    /// Create a service that persists registrations in `kv`
    pub fn new(kv: Arc<dyn ActorKV>) -> Result<Self> {
        let store_id = ActorId::new(REMINDER_STORE_NAMESPACE, REMINDER_STORE_ID)?;
        Ok(Self {
            inner: Arc::new(ServiceInner {
                store: ScopedKV::new(store_id, kv),
                sink: Arc::new(OnceCell::new()),
                timers: Mutex::new(HashMap::new()),
                delivery_timeout: Duration::from_millis(REMINDER_DELIVERY_TIMEOUT_MS_MAX),
            }),
        })
    }

    /// Attach the firing destination
    ///
    /// # Errors
    /// Fails if a sink is already attached.
    pub fn set_sink(&self, sink: Arc<dyn ReminderSink>) -> Result<()> {
        self.inner
            .sink
            .set(sink)
            .map_err(|_| Error::internal("reminder sink already set"))
    }

    /// Reload every persisted registration and arm its timer
    ///
    /// Returns the number of reminders armed. Unreadable records are logged
    /// and skipped.
    #[instrument(skip(self), level = "info")]
    pub async fn start(&self) -> Result<usize> {
        let keys = self.inner.store.list_keys(b"").await?;
        let mut armed = 0usize;

        for key in keys {
            let record = match self.inner.store.get(&key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "Failed to read reminder");
                    continue;
                }
            };

            match serde_json::from_slice::<Reminder>(&record) {
                Ok(reminder) => {
                    self.arm(reminder);
                    armed += 1;
                }
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "Skipping malformed reminder");
                }
            }
        }

        info!(count = armed, "Reminders restored");
        Ok(armed)
    }

    /// Stop all timers; registrations stay in storage
    pub fn shutdown(&self) {
        let stopped = self.lock_timers().drain().count();
        info!(count = stopped, "Reminder timers stopped");
    }

    /// Number of armed timers
    pub fn scheduled_count(&self) -> usize {
        self.lock_timers().len()
    }

    /// Check whether a timer is armed for the given reminder
    pub fn is_scheduled(&self, actor_id: &ActorId, name: &str) -> bool {
        self.lock_timers()
            .contains_key(&ReminderKey::new(actor_id.clone(), name))
    }

    /// Read a persisted registration
    pub async fn get(&self, actor_id: &ActorId, name: &str) -> Result<Option<Reminder>> {
        let key = ReminderKey::new(actor_id.clone(), name);
        match self.inner.store.get(Self::record_key(&key).as_bytes()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn record_key(key: &ReminderKey) -> String {
        key.to_string()
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<ReminderKey, TimerHandle>> {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start (or restart) the timer for a registration
    fn arm(&self, reminder: Reminder) {
        let key = reminder.key();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(run_timer(
            self.inner.sink.clone(),
            self.inner.delivery_timeout,
            reminder,
            cancel_rx,
        ));

        // Replacing the previous handle drops it, which cancels the old timer
        self.lock_timers().insert(
            key,
            TimerHandle {
                _cancel: cancel_tx,
            },
        );
    }
}

/// Fire `reminder` every period until cancelled
async fn run_timer(
    sink: SharedSink,
    delivery_timeout: Duration,
    reminder: Reminder,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let start = Instant::now() + Duration::from_millis(reminder.due_time_ms);
    let mut ticker = tokio::time::interval_at(start, Duration::from_millis(reminder.period_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = ticker.tick() => {}
        }

        let Some(target) = sink.get() else {
            warn!(reminder = %reminder.key(), "No reminder sink attached, firing dropped");
            continue;
        };

        // An in-flight delivery runs to completion even if cancelled meanwhile
        let delivery = tokio::time::timeout(
            delivery_timeout,
            target.deliver(&reminder.actor_id, &reminder.name),
        )
        .await;

        match delivery {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(reminder = %reminder.key(), error = %e, "Reminder delivery failed");
            }
            Err(_) => {
                warn!(reminder = %reminder.key(), "Reminder delivery timed out");
            }
        }
    }

    debug!(reminder = %reminder.key(), "Reminder timer stopped");
}

#[async_trait]
impl ReminderRegistry for ReminderService {
    #[instrument(skip(self, reminder), fields(actor_id = %reminder.actor_id, name = %reminder.name), level = "debug")]
    async fn register(&self, reminder: Reminder) -> Result<()> {
        reminder.validate()?;

        let record = serde_json::to_vec(&reminder)?;
        let key = Self::record_key(&reminder.key());
        self.inner.store.set(key.as_bytes(), &record).await?;

        self.arm(reminder);
        Ok(())
    }

    #[instrument(skip(self), fields(actor_id = %actor_id), level = "debug")]
    async fn unregister(&self, actor_id: &ActorId, name: &str) -> Result<()> {
        let key = ReminderKey::new(actor_id.clone(), name);

        self.inner
            .store
            .delete(Self::record_key(&key).as_bytes())
            .await?;
        self.lock_timers().remove(&key);

        Ok(())
    }
}
