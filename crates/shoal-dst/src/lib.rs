//! Shoal DST - Deterministic Simulation Testing
//!
//! TigerBeetle/FoundationDB-style deterministic simulation testing.
//!
//! # Overview
//!
//! DST lets the shape runtime be exercised with:
//! - Deterministic time control (SimClock, paused tokio timers)
//! - Reproducible random numbers (DeterministicRng)
//! - Fault injection on actor storage and the versioned index store
//!
//! # Example
//!
//! ```rust,ignore
//! use shoal_dst::{FaultConfig, FaultType, SimConfig, Simulation};
//!
//! #[test]
//! fn test_with_faults() {
//!     let config = SimConfig::from_env_or_random();
//!     Simulation::new(config)
//!         .with_fault(FaultConfig::new(FaultType::CasConflict, 0.2))
//!         .run(|env| async move {
//!             // Test code using env.storage, env.io_context, env.faults
//!             Ok(())
//!         })
//!         .unwrap();
//! }
//! ```
//!
//! # TigerStyle
//!
//! - All operations are deterministic given the same seed
//! - Always log the seed for reproducibility
//! - Explicit fault types and probabilities

pub mod clock;
pub mod fault;
pub mod rng;
pub mod simulation;
pub mod storage;

pub use clock::SimClock;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
pub use simulation::{SimConfig, SimEnvironment, Simulation, SimulationError};
pub use storage::SimStorage;
