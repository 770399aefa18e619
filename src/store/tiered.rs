//! Two-tier persistence façade for checkpoints
//!
//! Tries the durable store first with a bounded retry, then degrades to the
//! local fallback store. `reconcile` flushes fallback-only records back into
//! the durable store once it recovers.

use std::time::Duration;

use tracing::{debug, warn};

use crate::checkpoint::Checkpoint;

use super::durable::{DurableStore, SharedDurableStore, StoreResult};
use super::fallback::{FallbackStore, SharedFallbackStore};

/// Bounded fixed-delay retry for durable writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit attempts and delay
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Which tier ended up holding a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The durable store accepted the write
    Durable,
    /// The durable store was unreachable; the local fallback holds the record
    Fallback,
    /// Both tiers rejected the write; only in-memory state holds it
    Unpersisted,
}

/// Durable-first, fallback-second persistence façade
#[derive(Clone)]
pub struct TieredStore {
    durable: SharedDurableStore,
    fallback: SharedFallbackStore,
    retry: RetryPolicy,
}

impl TieredStore {
    /// Create a façade over a durable and a fallback store
    pub fn new(durable: SharedDurableStore, fallback: SharedFallbackStore) -> Self {
        Self {
            durable,
            fallback,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The durable tier
    pub fn durable(&self) -> &SharedDurableStore {
        &self.durable
    }

    /// Write a checkpoint, degrading to the fallback tier on durable outage
    pub async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> WriteOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.durable.put_checkpoint(checkpoint).await {
                Ok(()) => {
                    debug!(checkpoint_id = %checkpoint.id, "checkpoint persisted");
                    return WriteOutcome::Durable;
                }
                Err(error) if attempt < self.retry.max_attempts => {
                    debug!(
                        checkpoint_id = %checkpoint.id,
                        attempt,
                        "durable checkpoint write failed, retrying: {}",
                        error
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(error) => {
                    warn!(
                        checkpoint_id = %checkpoint.id,
                        "durable store unreachable after {} attempts, using fallback: {}",
                        attempt,
                        error
                    );
                    break;
                }
            }
        }

        let value = match serde_json::to_value(checkpoint) {
            Ok(value) => value,
            Err(error) => {
                warn!(checkpoint_id = %checkpoint.id, "checkpoint serialization failed: {}", error);
                return WriteOutcome::Unpersisted;
            }
        };

        match self
            .fallback
            .put(&checkpoint.workflow_id, &checkpoint.id, &value)
            .await
        {
            Ok(()) => WriteOutcome::Fallback,
            Err(error) => {
                warn!(checkpoint_id = %checkpoint.id, "fallback write failed: {}", error);
                WriteOutcome::Unpersisted
            }
        }
    }

    /// Read a checkpoint from the durable tier, then the fallback tier
    ///
    /// A store error is treated as a miss for that tier.
    pub async fn read_checkpoint(&self, workflow_id: &str, checkpoint_id: &str) -> Option<Checkpoint> {
        match self.durable.get_checkpoint(checkpoint_id).await {
            Ok(Some(checkpoint)) => return Some(checkpoint),
            Ok(None) => {}
            Err(error) => {
                debug!(checkpoint_id, "durable checkpoint read failed: {}", error);
            }
        }

        match self.fallback.get(workflow_id, checkpoint_id).await {
            Ok(Some(value)) => serde_json::from_value(value)
                .map_err(|error| {
                    warn!(checkpoint_id, "fallback checkpoint corrupt: {}", error);
                    error
                })
                .ok(),
            Ok(None) => None,
            Err(error) => {
                debug!(checkpoint_id, "fallback checkpoint read failed: {}", error);
                None
            }
        }
    }

    /// List checkpoints held by the durable tier for a (workflow, agent) pair
    pub async fn list_durable(
        &self,
        workflow_id: &str,
        agent_code: &str,
    ) -> StoreResult<Vec<Checkpoint>> {
        self.durable.list_checkpoints(workflow_id, agent_code).await
    }

    /// Delete a checkpoint from both tiers, best-effort
    pub async fn delete_checkpoint(&self, workflow_id: &str, checkpoint_id: &str) {
        if let Err(error) = self.durable.delete_checkpoint(checkpoint_id).await {
            debug!(checkpoint_id, "durable checkpoint delete failed: {}", error);
        }
        if let Err(error) = self.fallback.delete(workflow_id, checkpoint_id).await {
            debug!(checkpoint_id, "fallback checkpoint delete failed: {}", error);
        }
    }

    /// Flush fallback-only checkpoints for a workflow back into the durable
    /// store, removing entries that land
    ///
    /// Returns the number of records flushed. Records that still fail stay in
    /// the fallback for a later pass.
    pub async fn reconcile(&self, workflow_id: &str) -> usize {
        let entries = match self.fallback.list(workflow_id).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(workflow_id, "fallback listing failed during reconcile: {}", error);
                return 0;
            }
        };

        let mut flushed = 0;
        for (key, value) in entries {
            let checkpoint: Checkpoint = match serde_json::from_value(value) {
                Ok(checkpoint) => checkpoint,
                Err(error) => {
                    warn!(workflow_id, key, "skipping corrupt fallback record: {}", error);
                    continue;
                }
            };

            match self.durable.put_checkpoint(&checkpoint).await {
                Ok(()) => {
                    if let Err(error) = self.fallback.delete(workflow_id, &key).await {
                        debug!(workflow_id, key, "fallback cleanup failed: {}", error);
                    }
                    flushed += 1;
                }
                Err(error) => {
                    debug!(workflow_id, key, "durable still unreachable: {}", error);
                }
            }
        }

        if flushed > 0 {
            debug!(workflow_id, flushed, "reconciled fallback checkpoints");
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::store::{MemoryDurableStore, MemoryFallbackStore};
    use serde_json::json;
    use std::sync::Arc;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    fn sample_checkpoint(sequence: u64) -> Checkpoint {
        Checkpoint::new(
            "wf-1",
            "EXEC",
            "BUILD_START",
            json!({"step": sequence}),
            json!({}),
            sequence,
        )
    }

    #[tokio::test]
    async fn test_durable_write_preferred() {
        let durable = MemoryDurableStore::new().shared();
        let fallback = Arc::new(MemoryFallbackStore::new());
        let store = TieredStore::new(durable.clone(), fallback.clone()).with_retry(quick_retry());

        let checkpoint = sample_checkpoint(1);
        let outcome = store.write_checkpoint(&checkpoint).await;

        assert_eq!(outcome, WriteOutcome::Durable);
        assert!(fallback.is_empty().await);
    }

    #[tokio::test]
    async fn test_falls_back_on_durable_outage() {
        let durable = MemoryDurableStore::new().shared();
        let fallback = Arc::new(MemoryFallbackStore::new());
        let store = TieredStore::new(durable.clone(), fallback.clone()).with_retry(quick_retry());

        durable.set_fail_writes(true);
        let checkpoint = sample_checkpoint(1);
        let outcome = store.write_checkpoint(&checkpoint).await;

        assert_eq!(outcome, WriteOutcome::Fallback);

        // Still retrievable through the read path
        let restored = store.read_checkpoint("wf-1", &checkpoint.id).await.unwrap();
        assert_eq!(restored.state, json!({"step": 1}));
    }

    #[tokio::test]
    async fn test_reconcile_flushes_fallback() {
        let durable = MemoryDurableStore::new().shared();
        let fallback = Arc::new(MemoryFallbackStore::new());
        let store = TieredStore::new(durable.clone(), fallback.clone()).with_retry(quick_retry());

        durable.set_fail_writes(true);
        let checkpoint = sample_checkpoint(1);
        store.write_checkpoint(&checkpoint).await;
        assert_eq!(fallback.len().await, 1);

        // Durable recovers
        durable.set_fail_writes(false);
        let flushed = store.reconcile("wf-1").await;

        assert_eq!(flushed, 1);
        assert!(fallback.is_empty().await);
        assert!(durable
            .get_checkpoint(&checkpoint.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_reconcile_keeps_records_while_durable_down() {
        let durable = MemoryDurableStore::new().shared();
        let fallback = Arc::new(MemoryFallbackStore::new());
        let store = TieredStore::new(durable.clone(), fallback.clone()).with_retry(quick_retry());

        durable.set_fail_writes(true);
        store.write_checkpoint(&sample_checkpoint(1)).await;

        let flushed = store.reconcile("wf-1").await;
        assert_eq!(flushed, 0);
        assert_eq!(fallback.len().await, 1);
    }
}
