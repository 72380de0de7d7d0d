//! Simulation harness
//!
//! `run` drives a test on a current-thread tokio runtime with the timer
//! paused. Sleeps, intervals and timeouts then complete in virtual time as
//! soon as every task is idle, so reminder-driven scenarios that span
//! minutes finish instantly and in the same order for the same seed.

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector, FaultInjectorBuilder};
use crate::rng::DeterministicRng;
use crate::storage::SimStorage;
use shoal_core::{IoContext, RngProvider, TimeProvider};
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub seed: u64,
}

impl SimConfig {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from `DST_SEED`, or draw one at random; the seed is logged
    pub fn from_env_or_random() -> Self {
        Self::new(DeterministicRng::from_env_or_random().seed())
    }
}

/// Everything a simulated test gets to work with
///
/// All randomness below is forked from the one seed in [`SimConfig`].
pub struct SimEnvironment {
    pub clock: Arc<SimClock>,
    pub rng: Arc<DeterministicRng>,
    /// Time and randomness for code under test
    pub io_context: IoContext,
    /// Actor state and the shared versioned store, with faults applied
    pub storage: Arc<SimStorage>,
    pub faults: Arc<FaultInjector>,
}

impl SimEnvironment {
    fn build(seed: u64, faults: Vec<FaultConfig>) -> Self {
        let rng = Arc::new(DeterministicRng::new(seed));
        let clock = Arc::new(SimClock::default());

        let faults = Arc::new(
            faults
                .into_iter()
                .fold(FaultInjectorBuilder::new(rng.fork()), |builder, fault| {
                    builder.with_fault(fault)
                })
                .build(),
        );
        let io_context = IoContext::new(
            clock.clone() as Arc<dyn TimeProvider>,
            Arc::new(rng.fork()) as Arc<dyn RngProvider>,
        );
        let storage = Arc::new(SimStorage::new(rng.fork(), faults.clone()));

        Self {
            clock,
            rng,
            io_context,
            storage,
            faults,
        }
    }

    /// Independent stream for a workload driver
    pub fn fork_rng(&self) -> Arc<DeterministicRng> {
        Arc::new(self.rng.fork())
    }

    pub fn advance_time_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn time(&self) -> Arc<dyn TimeProvider> {
        self.io_context.time.clone()
    }

    pub fn rng_provider(&self) -> Arc<dyn RngProvider> {
        self.io_context.rng.clone()
    }
}

pub struct Simulation {
    config: SimConfig,
    faults: Vec<FaultConfig>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }

    /// Build the environment and run `test` to completion in virtual time
    pub fn run<F, Fut, T>(self, test: F) -> Result<T, SimulationError>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = shoal_core::Result<T>>,
    {
        let seed = self.config.seed;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .map_err(SimulationError::Runtime)?;

        tracing::info!(seed, faults = self.faults.len(), "running simulation");
        let env = SimEnvironment::build(seed, self.faults);
        runtime
            .block_on(test(env))
            .map_err(|source| SimulationError::TestFailed { seed, source })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("simulation with seed {seed} failed: {source}")]
    TestFailed {
        seed: u64,
        #[source]
        source: shoal_core::Error,
    },

    #[error("failed to build simulation runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
