//! Client configuration
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use clap::Args;
use shoal_core::constants::{
    CLIENT_REQUEST_TIMEOUT_MS_DEFAULT, CLIENT_SERVER_URL_DEFAULT,
    RECONCILER_LIVENESS_INTERVAL_MS_DEFAULT,
};
use shoal_core::error::{Error, Result};
use std::time::Duration;
use uuid::Uuid;

/// Settings for one client process
///
/// Each field is a CLI flag with an environment fallback.
#[derive(Args, Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL
    #[arg(long, env = "SHOAL_SERVER_URL", default_value = CLIENT_SERVER_URL_DEFAULT)]
    pub server_url: String,

    /// Owner id; a fresh one is generated when omitted
    #[arg(long, env = "SHOAL_OWNER_ID")]
    pub owner_id: Option<Uuid>,

    /// Liveness check interval in milliseconds
    #[arg(long, default_value_t = RECONCILER_LIVENESS_INTERVAL_MS_DEFAULT)]
    pub liveness_interval_ms: u64,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = CLIENT_REQUEST_TIMEOUT_MS_DEFAULT)]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: CLIENT_SERVER_URL_DEFAULT.to_string(),
            owner_id: None,
            liveness_interval_ms: RECONCILER_LIVENESS_INTERVAL_MS_DEFAULT,
            request_timeout_ms: CLIENT_REQUEST_TIMEOUT_MS_DEFAULT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::InvalidConfiguration {
                field: "server_url".into(),
                reason: format!("expected an http(s) URL, got {}", self.server_url),
            });
        }
        if self.liveness_interval_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "liveness_interval_ms".into(),
                reason: "must be positive".into(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "request_timeout_ms".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
