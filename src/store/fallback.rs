//! Local fallback store for degraded-mode checkpoint writes
//!
//! A scoped key-value store used when the durable store is unreachable.
//! Entries are flushed back to the durable store by
//! [`TieredStore::reconcile`](super::TieredStore::reconcile).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::durable::StoreResult;

/// Shared reference to a fallback store
pub type SharedFallbackStore = Arc<dyn FallbackStore>;

/// Scoped key-value store local to the process host
#[async_trait]
pub trait FallbackStore: Send + Sync {
    /// Store a value under a scope
    async fn put(&self, scope: &str, key: &str, value: &Value) -> StoreResult<()>;

    /// Fetch a value from a scope
    async fn get(&self, scope: &str, key: &str) -> StoreResult<Option<Value>>;

    /// List all entries in a scope, ordered by key
    async fn list(&self, scope: &str) -> StoreResult<Vec<(String, Value)>>;

    /// Delete an entry from a scope
    async fn delete(&self, scope: &str, key: &str) -> StoreResult<()>;
}

/// In-memory fallback store
#[derive(Default)]
pub struct MemoryFallbackStore {
    scopes: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryFallbackStore {
    /// Create an empty fallback store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedFallbackStore {
        Arc::new(self)
    }

    /// Number of entries across all scopes
    pub async fn len(&self) -> usize {
        self.scopes.read().await.values().map(|s| s.len()).sum()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbackStore {
    async fn put(&self, scope: &str, key: &str, value: &Value) -> StoreResult<()> {
        let mut scopes = self.scopes.write().await;
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, scope: &str, key: &str) -> StoreResult<Option<Value>> {
        let scopes = self.scopes.read().await;
        Ok(scopes.get(scope).and_then(|s| s.get(key)).cloned())
    }

    async fn list(&self, scope: &str) -> StoreResult<Vec<(String, Value)>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, scope: &str, key: &str) -> StoreResult<()> {
        let mut scopes = self.scopes.write().await;
        if let Some(entries) = scopes.get_mut(scope) {
            entries.remove(key);
        }
        Ok(())
    }
}
