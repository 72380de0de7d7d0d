//! Simulated storage for deterministic testing
//!
//! TigerStyle: In-memory storage with fault injection.
//!
//! Wraps the in-memory stores and consults a `FaultInjector` before every
//! operation. Operation names passed to the injector are `kv_get`, `kv_set`,
//! `kv_delete`, `kv_list`, `kv_get_versioned` and `kv_cas`, so faults can
//! be filtered per operation.

use crate::fault::{FaultInjector, FaultType};
use crate::rng::DeterministicRng;
use async_trait::async_trait;
use bytes::Bytes;
use shoal_core::io::RngProvider;
use shoal_core::{ActorId, Error, OccResult, Result, Version, Versioned};
use shoal_storage::{ActorKV, MemoryKV, MemoryVersionedKV, VersionedKV};
use std::sync::Arc;
use std::time::Duration;

/// Simulated storage for DST
pub struct SimStorage {
    actors: MemoryKV,
    shared: MemoryVersionedKV,
    fault_injector: Arc<FaultInjector>,
    rng: DeterministicRng,
}

impl SimStorage {
    pub fn new(rng: DeterministicRng, fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            actors: MemoryKV::new(),
            shared: MemoryVersionedKV::new(),
            fault_injector,
            rng,
        }
    }

    pub fn fault_injector(&self) -> &FaultInjector {
        &self.fault_injector
    }

    /// Apply any fault for `operation`; latency delays and then lets it run
    async fn check(&self, operation: &str, key: &str) -> Result<Option<FaultType>> {
        match self.fault_injector.should_inject(operation) {
            Some(FaultType::StorageLatency { min_ms, max_ms }) => {
                let delay_ms = if max_ms > min_ms {
                    self.rng.gen_range(min_ms, max_ms + 1)
                } else {
                    min_ms
                };
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(None)
            }
            Some(FaultType::StorageReadFail) => {
                Err(Error::storage_read_failed(key, "injected fault"))
            }
            Some(FaultType::StorageWriteFail) => {
                Err(Error::storage_write_failed(key, "injected fault"))
            }
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for SimStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimStorage")
            .field("seed", &self.rng.seed())
            .field("operations", &self.fault_injector.operation_count())
            .finish()
    }
}

fn display_key(actor_id: &ActorId, key: &[u8]) -> String {
    format!("{}/{}", actor_id, String::from_utf8_lossy(key))
}

#[async_trait]
impl ActorKV for SimStorage {
    async fn get(&self, actor_id: &ActorId, key: &[u8]) -> Result<Option<Bytes>> {
        self.check("kv_get", &display_key(actor_id, key)).await?;
        self.actors.get(actor_id, key).await
    }

    async fn set(&self, actor_id: &ActorId, key: &[u8], value: &[u8]) -> Result<()> {
        self.check("kv_set", &display_key(actor_id, key)).await?;
        self.actors.set(actor_id, key, value).await
    }

    async fn delete(&self, actor_id: &ActorId, key: &[u8]) -> Result<()> {
        self.check("kv_delete", &display_key(actor_id, key)).await?;
        self.actors.delete(actor_id, key).await
    }

    async fn list_keys(&self, actor_id: &ActorId, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.check("kv_list", &display_key(actor_id, prefix)).await?;
        self.actors.list_keys(actor_id, prefix).await
    }
}

#[async_trait]
impl VersionedKV for SimStorage {
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Bytes>>> {
        self.check("kv_get_versioned", key).await?;
        self.shared.get_versioned(key).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Version,
        value: Bytes,
    ) -> Result<OccResult<Version>> {
        if let Some(FaultType::CasConflict) = self.check("kv_cas", key).await? {
            let current_version = self.shared.get_versioned(key).await?.version;
            return Ok(OccResult::VersionConflict {
                read_version: expected,
                current_version,
            });
        }
        self.shared.compare_and_set(key, expected, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultConfig;

    fn storage(faults: Vec<FaultConfig>) -> SimStorage {
        let rng = DeterministicRng::new(7);
        let mut injector = FaultInjector::new(rng.fork());
        for fault in faults {
            injector.register(fault);
        }
        SimStorage::new(rng, Arc::new(injector))
    }

    fn actor() -> ActorId {
        ActorId::new("test", "a").unwrap()
    }

    #[tokio::test]
    async fn test_no_faults_behaves_like_memory() {
        let storage = storage(vec![]);
        storage.set(&actor(), b"k", b"v").await.unwrap();
        assert_eq!(storage.get(&actor(), b"k").await.unwrap(), Some(Bytes::from("v")));

        let read = storage.get_versioned("shared").await.unwrap();
        let written = storage
            .compare_and_set("shared", read.version, Bytes::from("x"))
            .await
            .unwrap();
        assert!(written.is_success());
    }

    #[tokio::test]
    async fn test_write_fault_leaves_value_untouched() {
        let storage = storage(vec![
            FaultConfig::new(FaultType::StorageWriteFail, 1.0).with_filter("kv_set").after(1),
        ]);
        storage.set(&actor(), b"k", b"first").await.unwrap();

        let result = storage.set(&actor(), b"k", b"second").await;
        assert!(matches!(result, Err(Error::StorageWriteFailed { .. })));
        assert_eq!(
            storage.get(&actor(), b"k").await.unwrap(),
            Some(Bytes::from("first"))
        );
    }

    #[tokio::test]
    async fn test_cas_conflict_fault_reports_current_version() {
        let storage = storage(vec![
            FaultConfig::new(FaultType::CasConflict, 1.0).max_triggers(1),
        ]);
        let read = storage.get_versioned("idx").await.unwrap();

        let first = storage
            .compare_and_set("idx", read.version, Bytes::from("a"))
            .await
            .unwrap();
        assert!(first.is_conflict());

        let second = storage
            .compare_and_set("idx", read.version, Bytes::from("a"))
            .await
            .unwrap();
        assert!(second.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_fault_delays_but_succeeds() {
        let storage = storage(vec![FaultConfig::new(
            FaultType::StorageLatency {
                min_ms: 50,
                max_ms: 50,
            },
            1.0,
        )]);
        let started = tokio::time::Instant::now();

        storage.set(&actor(), b"k", b"v").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
