//! Clock and randomness seams
//!
//! Shape creation draws random positions and velocities, and the runtime
//! timestamps activations and queued requests. Both go through the providers
//! below: the wall clock and an entropy-seeded `StdRng` in production, a
//! manually advanced clock and a seeded ChaCha stream under simulation.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[async_trait]
pub trait TimeProvider: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;

    async fn sleep_ms(&self, ms: u64);

    /// Timestamp used for elapsed-time bookkeeping
    fn monotonic_ms(&self) -> u64 {
        self.now_ms()
    }
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClockTime;

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_millis() as u64)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Source of randomness for actor and client code
///
/// Only `next_u64` is required; everything else derives from it, so a seeded
/// implementation makes every draw reproducible.
pub trait RngProvider: Send + Sync + fmt::Debug {
    fn next_u64(&self) -> u64;

    /// Uniform in `[0, 1)`
    fn next_f64(&self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Random (version 4) UUID
    fn gen_uuid(&self) -> Uuid {
        let high = u128::from(self.next_u64()) << 64;
        let bytes = (high | u128::from(self.next_u64())).to_be_bytes();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    fn gen_bool(&self, probability: f64) -> bool {
        debug_assert!((0.0..=1.0).contains(&probability));
        self.next_f64() < probability
    }

    /// Uniform in `[min, max)`
    fn gen_range(&self, min: u64, max: u64) -> u64 {
        assert!(min < max, "empty range {}..{}", min, max);
        min + self.next_u64() % (max - min)
    }
}

#[derive(Debug)]
pub struct StdRngProvider {
    rng: Mutex<StdRng>,
}

impl StdRngProvider {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl Default for StdRngProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RngProvider for StdRngProvider {
    fn next_u64(&self) -> u64 {
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .next_u64()
    }
}

/// The clock and RNG handed to one runtime or client
#[derive(Clone)]
pub struct IoContext {
    pub time: Arc<dyn TimeProvider>,
    pub rng: Arc<dyn RngProvider>,
}

impl IoContext {
    pub fn new(time: Arc<dyn TimeProvider>, rng: Arc<dyn RngProvider>) -> Self {
        Self { time, rng }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(WallClockTime), Arc::new(StdRngProvider::new()))
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    pub fn gen_uuid(&self) -> Uuid {
        self.rng.gen_uuid()
    }
}

impl Default for IoContext {
    fn default() -> Self {
        Self::production()
    }
}

impl fmt::Debug for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoContext")
            .field("time", &self.time)
            .field("rng", &self.rng)
            .finish()
    }
}
