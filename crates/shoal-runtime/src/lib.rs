//! Shoal Runtime
//!
//! Actor runtime, dispatcher, and durable reminders for Shoal virtual actors.
//!
//! # Overview
//!
//! The runtime provides:
//! - Single-threaded execution per actor, parallel across actors
//! - On-demand activation and idle deactivation
//! - Bounded mailboxes (no silent message drops)
//! - Reminders that outlive activations and process restarts
//!
//! # TigerStyle
//! - Single activation guarantee (one actor instance per ID)
//! - Explicit lifecycle states
//! - State persisted after every successful turn, rolled back on failure

pub mod activation;
pub mod dispatcher;
pub mod handle;
pub mod mailbox;
pub mod reminder;
pub mod runtime;

pub use activation::{ActivationState, ActivationStats, ActiveActor};
pub use dispatcher::{
    ActorFactory, CloneFactory, Dispatcher, DispatcherCommand, DispatcherConfig, DispatcherHandle,
};
pub use handle::{ActorHandle, ActorHandleBuilder};
pub use mailbox::{Envelope, Mailbox, MailboxFullError, MessageKind};
pub use reminder::{ReminderService, ReminderSink};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
