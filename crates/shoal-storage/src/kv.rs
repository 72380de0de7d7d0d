//! KV traits
//!
//! TigerStyle: Explicit operations, bounded sizes.

use async_trait::async_trait;
use bytes::Bytes;
use shoal_core::{ActorId, OccResult, Result, Version, Versioned};
use std::sync::Arc;

/// Per-actor KV store trait
///
/// Each actor sees a private keyspace. Writes are last-writer-wins; the
/// runtime guarantees a single writer per actor.
#[async_trait]
pub trait ActorKV: Send + Sync {
    /// Get a value by key
    async fn get(&self, actor_id: &ActorId, key: &[u8]) -> Result<Option<Bytes>>;

    /// Set a key-value pair
    async fn set(&self, actor_id: &ActorId, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    async fn delete(&self, actor_id: &ActorId, key: &[u8]) -> Result<()>;

    /// Check if a key exists
    async fn exists(&self, actor_id: &ActorId, key: &[u8]) -> Result<bool> {
        Ok(self.get(actor_id, key).await?.is_some())
    }

    /// List keys with a prefix
    async fn list_keys(&self, actor_id: &ActorId, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Shared multi-writer store with compare-and-swap writes
///
/// Every key carries a version. A key that was never written reads as
/// `Version::INITIAL` with no value.
#[async_trait]
pub trait VersionedKV: Send + Sync {
    /// Read a value together with its current version
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Bytes>>>;

    /// Write `value` iff the stored version still equals `expected`
    ///
    /// Returns the new version on success.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Version,
        value: Bytes,
    ) -> Result<OccResult<Version>>;
}

/// KV store bound to one actor
#[derive(Clone)]
pub struct ScopedKV {
    actor_id: ActorId,
    kv: Arc<dyn ActorKV>,
}

impl ScopedKV {
    /// Bind `kv` to `actor_id`
    pub fn new(actor_id: ActorId, kv: Arc<dyn ActorKV>) -> Self {
        Self { actor_id, kv }
    }

    /// The actor this store is bound to
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.kv.get(&self.actor_id, key).await
    }

    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.kv.set(&self.actor_id, key, value).await
    }

    pub async fn delete(&self, key: &[u8]) -> Result<()> {
        self.kv.delete(&self.actor_id, key).await
    }

    pub async fn list_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.kv.list_keys(&self.actor_id, prefix).await
    }
}

impl std::fmt::Debug for ScopedKV {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKV")
            .field("actor_id", &self.actor_id)
            .finish()
    }
}
