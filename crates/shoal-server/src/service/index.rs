//! Entity index service
//!
//! TigerStyle: Bounded optimistic retries, dedup on every read.
//!
//! One record per owner in the shared versioned store, holding a JSON array
//! of entity ids. Concurrent writers race through compare-and-swap; a loser
//! re-runs its whole read-modify-write after an exponential backoff. Records
//! written before dedup was enforced, or by racing writers of older
//! versions, may hold duplicates, so readers dedup as well.

use super::relay::Relay;
use bytes::Bytes;
use shoal_core::config::IndexConfig;
use shoal_core::constants::INDEX_ENTITIES_PER_OWNER_COUNT_MAX;
use shoal_core::{Error, OccResult, Result};
use shoal_storage::VersionedKV;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Membership change applied by one read-modify-write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexChange {
    Add,
    Remove,
}

impl IndexChange {
    fn operation(&self) -> &'static str {
        match self {
            IndexChange::Add => "index.add",
            IndexChange::Remove => "index.remove",
        }
    }
}

/// Per-owner set of entity ids
#[derive(Clone)]
pub struct IndexService {
    store: Arc<dyn VersionedKV>,
    relay: Relay,
    write_attempts_max: u32,
    retry_interval: Duration,
}

impl IndexService {
    pub fn new(store: Arc<dyn VersionedKV>, relay: Relay, config: &IndexConfig) -> Self {
        assert!(config.write_attempts_max > 0, "at least one write attempt");
        Self {
            store,
            relay,
            write_attempts_max: config.write_attempts_max,
            retry_interval: Duration::from_millis(config.retry_interval_ms),
        }
    }

    fn key(owner_id: Uuid) -> String {
        format!("entities/{}", owner_id)
    }

    /// Decode a stored record, dropping duplicates but keeping first-seen order
    fn decode(raw: Option<&Bytes>) -> Result<Vec<Uuid>> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let stored: Vec<Uuid> = serde_json::from_slice(raw)?;
        let mut seen = HashSet::with_capacity(stored.len());
        Ok(stored.into_iter().filter(|id| seen.insert(*id)).collect())
    }

    /// Entity ids of `owner_id`, deduplicated; empty when never written
    #[instrument(skip(self), fields(owner_id = %owner_id), level = "debug")]
    pub async fn list_entities(&self, owner_id: Uuid) -> Result<Vec<Uuid>> {
        let record = self.store.get_versioned(&Self::key(owner_id)).await?;
        Self::decode(record.value.as_ref())
    }

    /// Add `entity_id` to the owner's set; no-op if already present
    ///
    /// Returns whether the set changed.
    #[instrument(skip(self), fields(owner_id = %owner_id, entity_id = %entity_id), level = "debug")]
    pub async fn add_entity(&self, owner_id: Uuid, entity_id: Uuid) -> Result<bool> {
        self.update(owner_id, entity_id, IndexChange::Add).await
    }

    /// Remove `entity_id` from the owner's set; no-op if absent
    ///
    /// Stored shape state is left untouched.
    #[instrument(skip(self), fields(owner_id = %owner_id, entity_id = %entity_id), level = "debug")]
    pub async fn remove_entity(&self, owner_id: Uuid, entity_id: Uuid) -> Result<bool> {
        self.update(owner_id, entity_id, IndexChange::Remove).await
    }

    /// Forward a position change to every push connection
    pub fn relay_position_changed(&self, owner_id: Uuid, entity_id: Uuid) -> usize {
        let receivers = self.relay.publish(entity_id);
        debug!(owner_id = %owner_id, entity_id = %entity_id, receivers, "Position change relayed");
        receivers
    }

    async fn update(&self, owner_id: Uuid, entity_id: Uuid, change: IndexChange) -> Result<bool> {
        let operation = change.operation();
        let mut last_error = String::new();

        for attempt in 1..=self.write_attempts_max {
            match self.try_update(owner_id, entity_id, change).await {
                Ok(OccResult::Success(changed)) => return Ok(changed),
                Ok(OccResult::VersionConflict {
                    read_version,
                    current_version,
                }) => {
                    debug!(
                        attempt,
                        read = %read_version,
                        current = %current_version,
                        "Index write lost a race"
                    );
                    last_error = format!(
                        "version conflict (read {}, current {})",
                        read_version, current_version
                    );
                }
                Err(e) if e.is_retriable() => {
                    debug!(attempt, error = %e, "Index write failed transiently");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }

            if attempt < self.write_attempts_max {
                tokio::time::sleep(self.retry_interval * 2u32.pow(attempt - 1)).await;
            }
        }

        error!(
            operation,
            attempts = self.write_attempts_max,
            reason = %last_error,
            "Index write retries exhausted"
        );
        Err(Error::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.write_attempts_max,
            reason: last_error,
        })
    }

    /// One read-modify-write; `Success(false)` means nothing to write
    async fn try_update(
        &self,
        owner_id: Uuid,
        entity_id: Uuid,
        change: IndexChange,
    ) -> Result<OccResult<bool>> {
        let key = Self::key(owner_id);
        let record = self.store.get_versioned(&key).await?;
        let mut ids = Self::decode(record.value.as_ref())?;

        match change {
            IndexChange::Add => {
                if ids.contains(&entity_id) {
                    return Ok(OccResult::Success(false));
                }
                if ids.len() >= INDEX_ENTITIES_PER_OWNER_COUNT_MAX {
                    return Err(Error::InvalidOperation {
                        operation: format!(
                            "index.add: owner {} already has {} entities",
                            owner_id, INDEX_ENTITIES_PER_OWNER_COUNT_MAX
                        ),
                    });
                }
                ids.push(entity_id);
            }
            IndexChange::Remove => {
                let before = ids.len();
                ids.retain(|id| *id != entity_id);
                if ids.len() == before {
                    return Ok(OccResult::Success(false));
                }
            }
        }

        let value = Bytes::from(serde_json::to_vec(&ids)?);
        let outcome = self
            .store
            .compare_and_set(&key, record.version, value)
            .await?;

        Ok(match outcome {
            OccResult::Success(_) => OccResult::Success(true),
            OccResult::VersionConflict {
                read_version,
                current_version,
            } => OccResult::VersionConflict {
                read_version,
                current_version,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shoal_core::{Version, Versioned};
    use shoal_storage::MemoryVersionedKV;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service(store: Arc<dyn VersionedKV>, attempts: u32) -> IndexService {
        let config = IndexConfig {
            write_attempts_max: attempts,
            retry_interval_ms: 100,
        };
        IndexService::new(store, Relay::new(8), &config)
    }

    /// Store whose first `conflicts` writes lose a race
    struct ContendedKV {
        inner: MemoryVersionedKV,
        conflicts: AtomicU32,
        writes: AtomicU32,
    }

    impl ContendedKV {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryVersionedKV::new(),
                conflicts: AtomicU32::new(conflicts),
                writes: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl VersionedKV for ContendedKV {
        async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Bytes>>> {
            self.inner.get_versioned(key).await
        }

        async fn compare_and_set(
            &self,
            key: &str,
            expected: Version,
            value: Bytes,
        ) -> Result<OccResult<Version>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(OccResult::VersionConflict {
                    read_version: expected,
                    current_version: expected.increment(),
                });
            }
            self.inner.compare_and_set(key, expected, value).await
        }
    }

    #[tokio::test]
    async fn test_unknown_owner_lists_empty() {
        let index = service(Arc::new(MemoryVersionedKV::new()), 3);
        assert!(index.list_entities(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let index = service(Arc::new(MemoryVersionedKV::new()), 3);
        let owner = Uuid::new_v4();
        let entity = Uuid::new_v4();

        assert!(index.add_entity(owner, entity).await.unwrap());
        assert!(!index.add_entity(owner, entity).await.unwrap());

        assert_eq!(index.list_entities(owner).await.unwrap(), vec![entity]);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let index = service(Arc::new(MemoryVersionedKV::new()), 3);
        let owner = Uuid::new_v4();
        let kept = Uuid::new_v4();

        index.add_entity(owner, kept).await.unwrap();
        assert!(!index.remove_entity(owner, Uuid::new_v4()).await.unwrap());
        assert!(!index.remove_entity(Uuid::new_v4(), kept).await.unwrap());

        assert!(index.remove_entity(owner, kept).await.unwrap());
        assert!(index.list_entities(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let index = service(Arc::new(MemoryVersionedKV::new()), 3);
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let entity = Uuid::new_v4();

        index.add_entity(alice, entity).await.unwrap();
        assert!(index.list_entities(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stored_duplicates_are_hidden_and_healed() {
        let store = Arc::new(MemoryVersionedKV::new());
        let owner = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let raw = serde_json::to_vec(&vec![a, b, a, a, b]).unwrap();
        store
            .compare_and_set(&IndexService::key(owner), Version::INITIAL, Bytes::from(raw))
            .await
            .unwrap();

        let index = service(store, 3);
        assert_eq!(index.list_entities(owner).await.unwrap(), vec![a, b]);

        // removal rewrites the deduplicated set
        index.remove_entity(owner, b).await.unwrap();
        assert_eq!(index.list_entities(owner).await.unwrap(), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_retried_within_bound() {
        let store = Arc::new(ContendedKV::new(2));
        let index = service(store.clone(), 3);
        let owner = Uuid::new_v4();
        let entity = Uuid::new_v4();

        let started = tokio::time::Instant::now();
        assert!(index.add_entity(owner, entity).await.unwrap());

        // backoff of 100ms then 200ms
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(310));
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        assert_eq!(index.list_entities(owner).await.unwrap(), vec![entity]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_beyond_bound_surface() {
        let store = Arc::new(ContendedKV::new(3));
        let index = service(store.clone(), 3);
        let owner = Uuid::new_v4();

        let result = index.add_entity(owner, Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(index.list_entities(owner).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_adds_lose_nothing() {
        let index = service(Arc::new(MemoryVersionedKV::new()), 3);
        let owner = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let index = index.clone();
                let id = *id;
                tokio::spawn(async move { index.add_entity(owner, id).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        let mut listed = index.list_entities(owner).await.unwrap();
        let mut expected = ids.clone();
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_relay_position_changed_leaves_index_alone() {
        let relay = Relay::new(8);
        let mut rx = relay.subscribe();
        let index = IndexService::new(
            Arc::new(MemoryVersionedKV::new()),
            relay,
            &IndexConfig::default(),
        );
        let owner = Uuid::new_v4();
        let entity = Uuid::new_v4();

        assert_eq!(index.relay_position_changed(owner, entity), 1);
        assert_eq!(rx.recv().await.unwrap(), entity);
        assert!(index.list_entities(owner).await.unwrap().is_empty());
    }
}
