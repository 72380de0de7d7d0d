//! Actor-based shape implementation
//!
//! TigerStyle: ShapeActor implements the Actor trait from shoal-runtime,
//! providing single activation, reminder-driven motion, and state persistence.

pub mod shape_actor;

pub use shape_actor::{ShapeActor, ShapeActorState, OP_GET_CURRENT_POSITION, OP_UNREGISTER_REMINDER};
