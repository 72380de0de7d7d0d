//! Shoal Storage
//!
//! Key-value storage for Shoal actors and shared records.
//!
//! # Overview
//!
//! Two storage shapes are provided:
//! - [`ActorKV`]: a private keyspace per actor, last-writer-wins. Holds each
//!   shape's current state and the reminder registrations.
//! - [`VersionedKV`]: a shared keyspace with compare-and-swap writes. Holds
//!   the per-owner entity index, which has many concurrent writers.
//!
//! Both come with in-memory backends; `shoal-dst` wraps them with fault
//! injection.

pub mod kv;
pub mod memory;

pub use kv::{ActorKV, ScopedKV, VersionedKV};
pub use memory::{MemoryKV, MemoryVersionedKV};
