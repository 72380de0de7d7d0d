//! Shoal Client
//!
//! Keeps a client's own shapes bound and fresh against a Shoal server.
//!
//! # Overview
//!
//! - [`ShoalClient`]: index and actor calls over HTTP
//! - [`EventSource`]: the server's push channel, reconnecting with backoff
//! - [`Reconciler`]: single task owning the client's shape bindings
//!
//! # Example
//!
//! ```rust,ignore
//! let client = Arc::new(ShoalClient::new(&config.server_url, config.request_timeout())?);
//! let source = EventSource::new(client.hub_url(), config.request_timeout())?;
//! let (handle, mut events, task) = Reconciler::spawn(
//!     ReconcilerConfig { owner_id, liveness_interval: config.liveness_interval() },
//!     IoContext::production(),
//!     client.clone(),
//!     client,
//!     Box::new(source),
//! );
//! handle.restore().await?;
//! ```

pub mod client;
pub mod config;
pub mod events;
pub mod reconciler;

pub use client::{HealthResponse, IndexApi, ShapeApi, ShoalClient};
pub use config::ClientConfig;
pub use events::{EventSource, NotificationSource, SseEvent, SseParser};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerEvent, ReconcilerHandle};

/// One-line rendering of an error and all its causes
pub fn flatten_error(error: &anyhow::Error) -> String {
    format!("{:#}", error)
}
