//! Shoal Core
//!
//! Core types, errors, and constants for the Shoal shape actor system.
//!
//! # Overview
//!
//! Shoal runs one virtual actor per moving shape. Each actor owns its shape's
//! position, advances it on a durable reminder, and announces changes on a
//! pub/sub bus. A shared per-owner index records which shapes exist, and a push
//! relay fans position changes out to connected clients.
//!
//! This crate holds the pieces every other crate agrees on: identifiers, the
//! actor and reminder contracts, the motion model, bus payloads, errors,
//! limits, configuration, and the I/O providers used for deterministic tests.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `INDEX_WRITE_ATTEMPTS_COUNT_MAX`)
//! - No recursion (bounded iteration only)

pub mod actor;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod io;
pub mod occ;
pub mod reminder;
pub mod runtime;
pub mod shape;
pub mod telemetry;

pub use actor::{Actor, ActorContext, ActorId};
pub use config::ShoalConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use events::{
    OutboundEvent, ShapeEvent, TOPICS_ALL, TOPIC_ENTITY_CREATED, TOPIC_ENTITY_DELETED,
    TOPIC_ENTITY_POSITION_CHANGED,
};
pub use io::{IoContext, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
pub use occ::{OccResult, Version, Versioned};
pub use reminder::{NoOpReminders, Reminder, ReminderKey, ReminderRegistry};
pub use runtime::{current_runtime, CurrentRuntime, JoinError, JoinHandle, Runtime, TokioRuntime};
pub use shape::{Shape, ShapeKey};
pub use telemetry::{init_telemetry, TelemetryConfig};
