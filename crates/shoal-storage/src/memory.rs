//! In-memory storage
//!
//! For testing, DST simulations, and single-node deployments.
//!
//! TigerStyle: Simple in-memory implementation, one lock per store.

use crate::kv::{ActorKV, VersionedKV};
use async_trait::async_trait;
use bytes::Bytes;
use shoal_core::{ActorId, OccResult, Result, Version, Versioned};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

/// Per-actor KV data: key -> value
type ActorData = HashMap<Vec<u8>, Vec<u8>>;

/// Storage data: actor_id -> actor data
type StorageData = HashMap<String, ActorData>;

/// In-memory per-actor KV store
#[derive(Clone)]
pub struct MemoryKV {
    /// Data storage: actor_id -> (key -> value)
    data: Arc<RwLock<StorageData>>,
}

impl MemoryKV {
    /// Create a new in-memory KV store
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn actor_key(actor_id: &ActorId) -> String {
        actor_id.qualified_name()
    }
}

impl Default for MemoryKV {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActorKV for MemoryKV {
    #[instrument(skip(self, key), fields(actor_id = %actor_id, key_len = key.len()))]
    async fn get(&self, actor_id: &ActorId, key: &[u8]) -> Result<Option<Bytes>> {
        let data = self.data.read().await;

        Ok(data
            .get(&Self::actor_key(actor_id))
            .and_then(|actor_data| actor_data.get(key))
            .map(|v| Bytes::copy_from_slice(v)))
    }

    #[instrument(skip(self, key, value), fields(actor_id = %actor_id, key_len = key.len(), value_len = value.len()))]
    async fn set(&self, actor_id: &ActorId, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().await;

        data.entry(Self::actor_key(actor_id))
            .or_default()
            .insert(key.to_vec(), value.to_vec());

        Ok(())
    }

    #[instrument(skip(self, key), fields(actor_id = %actor_id, key_len = key.len()))]
    async fn delete(&self, actor_id: &ActorId, key: &[u8]) -> Result<()> {
        let mut data = self.data.write().await;

        if let Some(actor_data) = data.get_mut(&Self::actor_key(actor_id)) {
            actor_data.remove(key);
        }

        Ok(())
    }

    #[instrument(skip(self, prefix), fields(actor_id = %actor_id, prefix_len = prefix.len()))]
    async fn list_keys(&self, actor_id: &ActorId, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let data = self.data.read().await;

        let mut keys: Vec<Vec<u8>> = data
            .get(&Self::actor_key(actor_id))
            .map(|actor_data| {
                actor_data
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();

        Ok(keys)
    }
}

/// In-memory compare-and-swap store
#[derive(Clone, Default)]
pub struct MemoryVersionedKV {
    data: Arc<RwLock<HashMap<String, Versioned<Bytes>>>>,
}

impl MemoryVersionedKV {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionedKV for MemoryVersionedKV {
    #[instrument(skip(self), level = "trace")]
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Bytes>>> {
        let data = self.data.read().await;

        Ok(match data.get(key) {
            Some(stored) => Versioned::new(Some(stored.value.clone()), stored.version),
            None => Versioned::initial(None),
        })
    }

    #[instrument(skip(self, value), fields(expected = %expected, value_len = value.len()), level = "trace")]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Version,
        value: Bytes,
    ) -> Result<OccResult<Version>> {
        let mut data = self.data.write().await;

        let current = data.get(key).map(|v| v.version).unwrap_or(Version::INITIAL);
        if current != expected {
            return Ok(OccResult::VersionConflict {
                read_version: expected,
                current_version: current,
            });
        }

        let next = current.increment();
        data.insert(key.to_string(), Versioned::new(value, next));

        debug_assert!(next > expected);
        Ok(OccResult::Success(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::ScopedKV;

    #[tokio::test]
    async fn test_memory_kv_basic() {
        let kv = MemoryKV::new();
        let actor_id = ActorId::new("test", "actor-1").unwrap();

        kv.set(&actor_id, b"key1", b"value1").await.unwrap();
        let value = kv.get(&actor_id, b"key1").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value1")));
        assert!(kv.exists(&actor_id, b"key1").await.unwrap());

        kv.delete(&actor_id, b"key1").await.unwrap();
        assert!(kv.get(&actor_id, b"key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_kv_isolation() {
        let kv = MemoryKV::new();
        let actor1 = ActorId::new("test", "actor-1").unwrap();
        let actor2 = ActorId::new("test", "actor-2").unwrap();

        kv.set(&actor1, b"key", b"value1").await.unwrap();
        kv.set(&actor2, b"key", b"value2").await.unwrap();

        assert_eq!(
            kv.get(&actor1, b"key").await.unwrap(),
            Some(Bytes::from("value1"))
        );
        assert_eq!(
            kv.get(&actor2, b"key").await.unwrap(),
            Some(Bytes::from("value2"))
        );
    }

    #[tokio::test]
    async fn test_memory_kv_list_keys_prefix() {
        let kv = MemoryKV::new();
        let actor_id = ActorId::new("system", "reminders").unwrap();

        kv.set(&actor_id, b"shape:a/advance", b"1").await.unwrap();
        kv.set(&actor_id, b"shape:b/advance", b"2").await.unwrap();
        kv.set(&actor_id, b"other", b"3").await.unwrap();

        let keys = kv.list_keys(&actor_id, b"shape:").await.unwrap();
        assert_eq!(
            keys,
            vec![b"shape:a/advance".to_vec(), b"shape:b/advance".to_vec()]
        );
        assert_eq!(kv.list_keys(&actor_id, b"").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scoped_kv() {
        let kv = Arc::new(MemoryKV::new());
        let actor_id = ActorId::new("test", "scoped").unwrap();
        let scoped = ScopedKV::new(actor_id.clone(), kv.clone());

        scoped.set(b"k", b"v").await.unwrap();
        assert_eq!(kv.get(&actor_id, b"k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(scoped.list_keys(b"").await.unwrap(), vec![b"k".to_vec()]);

        scoped.delete(b"k").await.unwrap();
        assert!(scoped.get(b"k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_versioned_absent_key_reads_initial() {
        let kv = MemoryVersionedKV::new();
        let read = kv.get_versioned("owner").await.unwrap();

        assert!(read.value.is_none());
        assert_eq!(read.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn test_versioned_compare_and_set() {
        let kv = MemoryVersionedKV::new();

        let v1 = kv
            .compare_and_set("owner", Version::INITIAL, Bytes::from("a"))
            .await
            .unwrap();
        assert_eq!(v1, OccResult::Success(Version::new(1)));

        let read = kv.get_versioned("owner").await.unwrap();
        assert_eq!(read.value, Some(Bytes::from("a")));
        assert_eq!(read.version, Version::new(1));

        let v2 = kv
            .compare_and_set("owner", Version::new(1), Bytes::from("b"))
            .await
            .unwrap();
        assert_eq!(v2, OccResult::Success(Version::new(2)));
    }

    #[tokio::test]
    async fn test_versioned_stale_write_conflicts() {
        let kv = MemoryVersionedKV::new();
        kv.compare_and_set("owner", Version::INITIAL, Bytes::from("first"))
            .await
            .unwrap();

        // A second writer that read before the first commit loses
        let stale = kv
            .compare_and_set("owner", Version::INITIAL, Bytes::from("second"))
            .await
            .unwrap();
        assert_eq!(
            stale,
            OccResult::VersionConflict {
                read_version: Version::INITIAL,
                current_version: Version::new(1),
            }
        );

        let read = kv.get_versioned("owner").await.unwrap();
        assert_eq!(read.value, Some(Bytes::from("first")));
    }
}
