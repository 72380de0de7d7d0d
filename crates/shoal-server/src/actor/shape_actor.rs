//! ShapeActor implementation
//!
//! TigerStyle: One actor per shape, reminder-driven motion, pull-model events.
//!
//! The actor id encodes the owner and shape ids (see `ShapeKey`). On every
//! activation the actor creates its shape if none is stored, (re)registers
//! the `advance` reminder and announces itself on `entity-created`. Each
//! `advance` firing moves the shape one step and announces
//! `entity-position-changed`; the event carries ids only, so observers read
//! the position back through `get_current_position`.
//!
//! Announcements are queued on the context and reach the bus only after the
//! runtime has saved the turn's state.

use crate::bus::EventBus;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shoal_core::actor::{Actor, ActorContext, ActorId};
use shoal_core::config::ShapeConfig;
use shoal_core::constants::SHAPE_ADVANCE_REMINDER_NAME;
use shoal_core::events::{
    OutboundEvent, ShapeEvent, TOPIC_ENTITY_CREATED, TOPIC_ENTITY_POSITION_CHANGED,
};
use shoal_core::io::RngProvider;
use shoal_core::shape::{Shape, ShapeKey};
use shoal_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Read the stored shape
pub const OP_GET_CURRENT_POSITION: &str = "get_current_position";

/// Stop the `advance` reminder
pub const OP_UNREGISTER_REMINDER: &str = "unregister_reminder";

/// Persisted state of one shape actor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeActorState {
    /// None until the first activation creates it
    pub shape: Option<Shape>,
}

/// Actor owning one shape's motion
#[derive(Clone)]
pub struct ShapeActor {
    bus: Arc<dyn EventBus>,
    rng: Arc<dyn RngProvider>,
    advance_due_ms: u64,
    advance_period_ms: u64,
}

impl ShapeActor {
    pub fn new(bus: Arc<dyn EventBus>, rng: Arc<dyn RngProvider>, config: &ShapeConfig) -> Self {
        Self {
            bus,
            rng,
            advance_due_ms: config.advance_due_ms,
            advance_period_ms: config.advance_period_ms,
        }
    }

    fn handle_get_current_position(&self, ctx: &ActorContext<ShapeActorState>) -> Result<Shape> {
        ctx.state.shape.ok_or_else(|| Error::StateNotFound {
            id: ctx.id.qualified_name(),
        })
    }

    async fn handle_advance(&self, ctx: &mut ActorContext<ShapeActorState>) -> Result<()> {
        let key = ShapeKey::from_actor_id(&ctx.id)?;

        let Some(shape) = ctx.state.shape.as_mut() else {
            warn!(actor_id = %ctx.id, "No stored shape on advance; skipping tick");
            return Ok(());
        };
        shape.advance();
        debug_assert!(shape.is_within_overshoot());

        ctx.publish(TOPIC_ENTITY_POSITION_CHANGED, ShapeEvent::from(key));
        Ok(())
    }
}

#[async_trait]
impl Actor for ShapeActor {
    type State = ShapeActorState;

    async fn invoke(
        &self,
        ctx: &mut ActorContext<Self::State>,
        operation: &str,
        _payload: Bytes,
    ) -> Result<Bytes> {
        match operation {
            OP_GET_CURRENT_POSITION => {
                let shape = self.handle_get_current_position(ctx)?;
                Ok(Bytes::from(serde_json::to_vec(&shape)?))
            }
            OP_UNREGISTER_REMINDER => {
                ctx.unregister_reminder(SHAPE_ADVANCE_REMINDER_NAME);
                info!(actor_id = %ctx.id, "Unregistering advance reminder");
                Ok(Bytes::new())
            }
            _ => Err(Error::InvalidOperation {
                operation: operation.to_string(),
            }),
        }
    }

    async fn receive_reminder(&self, ctx: &mut ActorContext<Self::State>, name: &str) -> Result<()> {
        if name == SHAPE_ADVANCE_REMINDER_NAME {
            self.handle_advance(ctx).await
        } else {
            debug!(actor_id = %ctx.id, reminder = name, "Ignoring unknown reminder");
            Ok(())
        }
    }

    #[instrument(skip(self, ctx), fields(actor_id = %ctx.id), level = "info")]
    async fn on_activate(&self, ctx: &mut ActorContext<Self::State>) -> Result<()> {
        let key = ShapeKey::from_actor_id(&ctx.id)?;

        if ctx.state.shape.is_none() {
            let shape = Shape::random(self.rng.as_ref());
            debug_assert!(shape.is_within_bounds());
            info!(x = shape.x, y = shape.y, "Created shape");
            ctx.state.shape = Some(shape);
        }

        ctx.register_reminder(
            SHAPE_ADVANCE_REMINDER_NAME,
            self.advance_due_ms,
            self.advance_period_ms,
        )?;

        ctx.publish(TOPIC_ENTITY_CREATED, ShapeEvent::from(key));
        Ok(())
    }

    async fn on_deactivate(&self, ctx: &mut ActorContext<Self::State>) -> Result<()> {
        info!(actor_id = %ctx.id, "Shape deactivated");
        Ok(())
    }

    /// Publish without failing the turn; subscribers reconcile through the index
    async fn publish_committed(&self, id: &ActorId, events: Vec<OutboundEvent>) {
        for OutboundEvent { topic, event } in events {
            if let Err(e) = self.bus.publish(&topic, &event).await {
                warn!(
                    actor_id = %id,
                    topic = %topic,
                    error = %e,
                    "Failed to publish shape event"
                );
            }
        }
    }
}
