//! Fault injection for simulated storage
//!
//! Rules are checked in registration order; the first one that is armed and
//! wins its probability roll decides the fault.

use crate::rng::DeterministicRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Types of faults that can be injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultType {
    /// Storage write operation fails
    StorageWriteFail,
    /// Storage read operation fails
    StorageReadFail,
    /// Storage operations are slow
    StorageLatency { min_ms: u64, max_ms: u64 },
    /// A compare-and-set loses to a phantom concurrent writer
    CasConflict,
}

impl FaultType {
    pub fn name(&self) -> &'static str {
        match self {
            FaultType::StorageWriteFail => "storage_write_fail",
            FaultType::StorageReadFail => "storage_read_fail",
            FaultType::StorageLatency { .. } => "storage_latency",
            FaultType::CasConflict => "cas_conflict",
        }
    }
}

/// Configuration for a fault injection rule
#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub fault_type: FaultType,
    /// Probability of injection (0.0 - 1.0)
    pub probability: f64,
    /// Only operations whose name contains this string
    pub operation_filter: Option<String>,
    /// Only trigger after this many operations
    pub after_operations: u64,
    /// Maximum number of times to trigger
    pub max_triggers: Option<u64>,
}

impl FaultConfig {
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&probability));
        Self {
            fault_type,
            probability,
            operation_filter: None,
            after_operations: 0,
            max_triggers: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    pub fn after(mut self, operations: u64) -> Self {
        self.after_operations = operations;
        self
    }

    pub fn max_triggers(mut self, max: u64) -> Self {
        self.max_triggers = Some(max);
        self
    }
}

#[derive(Debug)]
struct FaultState {
    config: FaultConfig,
    fired: AtomicU64,
}

impl FaultState {
    /// Whether this rule applies to the `index`-th operation, named `operation`
    fn armed(&self, index: u64, operation: &str) -> bool {
        let config = &self.config;
        let matches = config
            .operation_filter
            .as_deref()
            .map_or(true, |filter| operation.contains(filter));
        let exhausted = config
            .max_triggers
            .is_some_and(|max| self.fired.load(Ordering::SeqCst) >= max);
        matches && index >= config.after_operations && !exhausted
    }
}

/// Decides, deterministically per seed, when an operation fails
#[derive(Debug)]
pub struct FaultInjector {
    faults: Vec<FaultState>,
    rng: DeterministicRng,
    operations: AtomicU64,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            faults: Vec::new(),
            rng,
            operations: AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, config: FaultConfig) {
        self.faults.push(FaultState {
            config,
            fired: AtomicU64::new(0),
        });
    }

    /// First registered fault that fires for `operation`, if any
    ///
    /// Every call counts as one operation, whether or not a fault fires.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        let index = self.operations.fetch_add(1, Ordering::SeqCst);

        let state = self
            .faults
            .iter()
            .filter(|state| state.armed(index, operation))
            .find(|state| self.rng.next_bool(state.config.probability))?;

        let fired = state.fired.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            fault = state.config.fault_type.name(),
            operation,
            fired,
            "injecting fault"
        );
        Some(state.config.fault_type.clone())
    }

    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of times each registered fault has fired, in registration order
    pub fn trigger_counts(&self) -> Vec<(&'static str, u64)> {
        self.faults
            .iter()
            .map(|state| {
                (
                    state.config.fault_type.name(),
                    state.fired.load(Ordering::SeqCst),
                )
            })
            .collect()
    }

    /// Sum of all triggers
    pub fn total_triggers(&self) -> u64 {
        self.trigger_counts().iter().map(|(_, count)| count).sum()
    }
}

/// Builder for creating a FaultInjector with multiple faults
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    faults: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.faults.push(config);
        self
    }

    /// Read and write failures at the same probability
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability))
    }

    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.faults {
            injector.register(config);
        }
        injector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_injection_probability_extremes() {
        let mut always = FaultInjector::new(DeterministicRng::new(42));
        always.register(FaultConfig::new(FaultType::StorageWriteFail, 1.0));
        let mut never = FaultInjector::new(DeterministicRng::new(42));
        never.register(FaultConfig::new(FaultType::StorageWriteFail, 0.0));

        for _ in 0..50 {
            assert_eq!(always.should_inject("write"), Some(FaultType::StorageWriteFail));
            assert!(never.should_inject("write").is_none());
        }
    }

    #[test]
    fn test_fault_injection_filter() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(FaultConfig::new(FaultType::CasConflict, 1.0).with_filter("cas"));

        assert!(injector.should_inject("kv_cas").is_some());
        assert!(injector.should_inject("kv_get").is_none());
    }

    #[test]
    fn test_fault_injection_after_and_max_triggers() {
        let mut injector = FaultInjector::new(DeterministicRng::new(42));
        injector.register(
            FaultConfig::new(FaultType::StorageReadFail, 1.0)
                .after(1)
                .max_triggers(2),
        );

        assert!(injector.should_inject("read").is_none());
        assert!(injector.should_inject("read").is_some());
        assert!(injector.should_inject("read").is_some());
        assert!(injector.should_inject("read").is_none());
        assert_eq!(injector.total_triggers(), 2);
        assert_eq!(injector.operation_count(), 4);
    }

    #[test]
    fn test_builder_registers_storage_faults() {
        let injector = FaultInjectorBuilder::new(DeterministicRng::new(42))
            .with_storage_faults(0.1)
            .with_fault(FaultConfig::new(FaultType::CasConflict, 0.5))
            .build();

        let names: Vec<_> = injector.trigger_counts().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["storage_write_fail", "storage_read_fail", "cas_conflict"]);
    }
}
