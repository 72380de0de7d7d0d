//! Pub/sub topics and payloads
//!
//! Every topic carries the same payload: the owning client and the shape.
//! Position changes deliberately omit the position; consumers re-read it.

use crate::shape::ShapeKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shape actor was activated for the first time
pub const TOPIC_ENTITY_CREATED: &str = "entity-created";

/// A shape actor advanced its position
pub const TOPIC_ENTITY_POSITION_CHANGED: &str = "entity-position-changed";

/// A shape should be removed from its owner's index
pub const TOPIC_ENTITY_DELETED: &str = "entity-deleted";

/// All topics, in subscription order
pub const TOPICS_ALL: [&str; 3] = [
    TOPIC_ENTITY_CREATED,
    TOPIC_ENTITY_POSITION_CHANGED,
    TOPIC_ENTITY_DELETED,
];

/// Bus payload identifying one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeEvent {
    pub client_id: Uuid,
    pub shape_id: Uuid,
}

impl ShapeEvent {
    pub fn new(client_id: Uuid, shape_id: Uuid) -> Self {
        Self {
            client_id,
            shape_id,
        }
    }

    pub fn key(&self) -> ShapeKey {
        ShapeKey::new(self.client_id, self.shape_id)
    }
}

impl From<ShapeKey> for ShapeEvent {
    fn from(key: ShapeKey) -> Self {
        Self::new(key.owner_id, key.shape_id)
    }
}

/// An event queued by an actor turn
///
/// The runtime hands these back to the actor for delivery only after the
/// turn's state is saved, so subscribers never hear about a turn that was
/// rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub topic: String,
    pub event: ShapeEvent,
}

impl OutboundEvent {
    pub fn new(topic: impl Into<String>, event: ShapeEvent) -> Self {
        Self {
            topic: topic.into(),
            event,
        }
    }
}
