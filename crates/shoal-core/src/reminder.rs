//! Reminder contract between actors and the scheduler
//!
//! TigerStyle: Durable periodic callbacks keyed by (actor, name).
//!
//! A reminder is state owned by the runtime, not by the actor process. Exactly
//! one registration exists per (actor id, reminder name); registering again
//! overwrites the schedule. Firings are at-least-once and roughly periodic.

use crate::actor::ActorId;
use crate::constants::{
    REMINDER_INTERVAL_MS_MAX, REMINDER_NAME_LENGTH_BYTES_MAX, REMINDER_PERIOD_MS_MIN,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reminder registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Actor the reminder fires into
    pub actor_id: ActorId,
    /// Reminder name, unique per actor
    pub name: String,
    /// Delay before the first firing
    pub due_time_ms: u64,
    /// Interval between firings
    pub period_ms: u64,
}

impl Reminder {
    /// Create a validated reminder
    pub fn new(
        actor_id: ActorId,
        name: impl Into<String>,
        due_time_ms: u64,
        period_ms: u64,
    ) -> Result<Self> {
        let reminder = Self {
            actor_id,
            name: name.into(),
            due_time_ms,
            period_ms,
        };
        reminder.validate()?;
        Ok(reminder)
    }

    /// Check name and schedule limits
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidReminder {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.name.len() > REMINDER_NAME_LENGTH_BYTES_MAX {
            return Err(invalid(format!(
                "name length {} exceeds limit {}",
                self.name.len(),
                REMINDER_NAME_LENGTH_BYTES_MAX
            )));
        }
        if self.period_ms < REMINDER_PERIOD_MS_MIN {
            return Err(invalid(format!(
                "period {}ms below minimum {}ms",
                self.period_ms, REMINDER_PERIOD_MS_MIN
            )));
        }
        if self.period_ms > REMINDER_INTERVAL_MS_MAX || self.due_time_ms > REMINDER_INTERVAL_MS_MAX
        {
            return Err(invalid(format!(
                "schedule exceeds limit {}ms",
                REMINDER_INTERVAL_MS_MAX
            )));
        }
        Ok(())
    }

    /// Key identifying this registration
    pub fn key(&self) -> ReminderKey {
        ReminderKey::new(self.actor_id.clone(), self.name.clone())
    }
}

/// Identity of a reminder registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub actor_id: ActorId,
    pub name: String,
}

impl ReminderKey {
    pub fn new(actor_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            actor_id,
            name: name.into(),
        }
    }
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.actor_id, self.name)
    }
}

/// Registration surface handed to actors through their context
#[async_trait]
pub trait ReminderRegistry: Send + Sync {
    /// Register or overwrite a reminder
    async fn register(&self, reminder: Reminder) -> Result<()>;

    /// Remove a reminder; removing an absent reminder is not an error
    async fn unregister(&self, actor_id: &ActorId, name: &str) -> Result<()>;
}

/// Registry that accepts and forgets every registration
///
/// Used by actors activated outside a runtime (unit tests, tooling).
#[derive(Debug, Clone, Default)]
pub struct NoOpReminders;

#[async_trait]
impl ReminderRegistry for NoOpReminders {
    async fn register(&self, reminder: Reminder) -> Result<()> {
        reminder.validate()
    }

    async fn unregister(&self, _actor_id: &ActorId, _name: &str) -> Result<()> {
        Ok(())
    }
}
