//! Service layer behind the HTTP surface
//!
//! TigerStyle: Services wrap storage and channels, handlers stay thin.

pub mod consumer;
pub mod index;
pub mod relay;

pub use consumer::{dispatch, BusConsumer};
pub use index::IndexService;
pub use relay::Relay;
