//! Manually advanced clock
//!
//! Backs the [`TimeProvider`] handed to code under simulation. Tokio's own
//! timers are paused separately by the harness; this clock only moves when a
//! test calls `advance_ms`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoal_core::io::TimeProvider;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// 2024-01-01T00:00:00Z
const SIM_EPOCH_MS: u64 = 1_704_067_200_000;

#[derive(Debug, Clone)]
pub struct SimClock {
    now_ms: Arc<AtomicU64>,
    advanced: Arc<Notify>,
}

impl SimClock {
    pub fn from_millis(ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(ms)),
            advanced: Arc::new(Notify::new()),
        }
    }

    /// Wall-clock rendering of the current simulated instant
    pub fn now(&self) -> DateTime<Utc> {
        i64::try_from(self.read())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default()
    }

    /// Move time forward and wake every sleeper so each can re-check its deadline
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }

    fn read(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::from_millis(SIM_EPOCH_MS)
    }
}

#[async_trait]
impl TimeProvider for SimClock {
    fn now_ms(&self) -> u64 {
        self.read()
    }

    async fn sleep_ms(&self, ms: u64) {
        let deadline = self.read().saturating_add(ms);
        loop {
            // Register before checking so an advance in between still wakes us
            let advanced = self.advanced.notified();
            if self.read() >= deadline {
                return;
            }
            advanced.await;
        }
    }
}
