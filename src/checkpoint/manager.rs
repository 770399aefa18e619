//! Checkpoint manager
//!
//! One manager per (workflow, agent) pair. Writes go through the tiered
//! store — durable first, local fallback on outage — and always land in the
//! in-memory ordered list, so creating a checkpoint never fails the caller.
//! Restores walk three tiers: memory, durable, fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CheckpointConfig;
use crate::events::{AgentEventBus, EventKind, EventPayload, Priority, PublishOptions};
use crate::store::{StoreResult, TieredStore, WriteOutcome};

use super::types::Checkpoint;

/// Shared reference to a checkpoint manager
pub type SharedCheckpointManager = Arc<CheckpointManager>;

/// Per-(workflow, agent) checkpoint lifecycle
pub struct CheckpointManager {
    workflow_id: String,
    agent_code: String,
    store: TieredStore,
    bus: Arc<AgentEventBus>,
    config: CheckpointConfig,
    memory: Mutex<Vec<Checkpoint>>,
    next_sequence: AtomicU64,
}

impl CheckpointManager {
    /// Create a new checkpoint manager
    pub fn new(
        workflow_id: impl Into<String>,
        agent_code: impl Into<String>,
        store: TieredStore,
        bus: Arc<AgentEventBus>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            agent_code: agent_code.into(),
            store,
            bus,
            config,
            memory: Mutex::new(Vec::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Create a shared reference to this manager
    pub fn shared(self) -> SharedCheckpointManager {
        Arc::new(self)
    }

    /// The workflow this manager is scoped to
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// The agent this manager is scoped to
    pub fn agent_code(&self) -> &str {
        &self.agent_code
    }

    /// Reload the in-memory list and sequence counter from the durable store
    ///
    /// Call after a process restart before resuming a workflow. Returns the
    /// number of checkpoints recovered.
    pub async fn hydrate(&self) -> StoreResult<usize> {
        let stored = self
            .store
            .list_durable(&self.workflow_id, &self.agent_code)
            .await?;

        let count = stored.len();
        let max_sequence = stored.iter().map(|c| c.sequence).max().unwrap_or(0);
        self.next_sequence.fetch_max(max_sequence, Ordering::SeqCst);
        *self.memory.lock().await = stored;

        debug!(
            workflow_id = %self.workflow_id,
            agent = %self.agent_code,
            count,
            "checkpoint manager hydrated"
        );
        Ok(count)
    }

    /// Create a checkpoint at a phase boundary
    ///
    /// Persistence degrades from durable to fallback to memory-only; the
    /// caller always gets a checkpoint back.
    pub async fn create_checkpoint(&self, phase: &str, state: Value, metadata: Value) -> Checkpoint {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let checkpoint = Checkpoint::new(
            self.workflow_id.clone(),
            self.agent_code.clone(),
            phase,
            state,
            metadata,
            sequence,
        );

        match self.store.write_checkpoint(&checkpoint).await {
            WriteOutcome::Durable => {}
            WriteOutcome::Fallback => {
                warn!(
                    checkpoint_id = %checkpoint.id,
                    "checkpoint held in local fallback until durable store recovers"
                );
            }
            WriteOutcome::Unpersisted => {
                warn!(checkpoint_id = %checkpoint.id, "checkpoint held in memory only");
            }
        }

        self.memory.lock().await.push(checkpoint.clone());

        self.bus
            .publish(
                EventKind::Checkpoint,
                format!("Checkpoint at {}", phase),
                EventPayload::CheckpointNotice {
                    checkpoint_id: checkpoint.id.clone(),
                    workflow_id: self.workflow_id.clone(),
                    phase: phase.to_string(),
                    sequence,
                },
                PublishOptions {
                    priority: Priority::Low,
                    ..PublishOptions::default()
                },
            )
            .await;

        debug!(
            checkpoint_id = %checkpoint.id,
            phase,
            sequence,
            "checkpoint created"
        );
        checkpoint
    }

    /// Restore the state snapshot stored under a checkpoint id
    ///
    /// Looks through memory, then the durable store, then the local fallback.
    /// An id found nowhere is a soft miss, not an error.
    pub async fn restore(&self, checkpoint_id: &str) -> Option<Value> {
        let from_memory = self
            .memory
            .lock()
            .await
            .iter()
            .find(|c| c.id == checkpoint_id)
            .cloned();

        let checkpoint = match from_memory {
            Some(checkpoint) => Some(checkpoint),
            None => {
                self.store
                    .read_checkpoint(&self.workflow_id, checkpoint_id)
                    .await
            }
        };

        let Some(checkpoint) = checkpoint else {
            debug!(checkpoint_id, "checkpoint not found in any tier");
            return None;
        };

        self.bus
            .publish(
                EventKind::Recovery,
                format!("Recovered from checkpoint {}", checkpoint_id),
                EventPayload::RecoveryNotice {
                    checkpoint_id: checkpoint_id.to_string(),
                    workflow_id: self.workflow_id.clone(),
                    phase: checkpoint.phase.clone(),
                },
                PublishOptions {
                    priority: Priority::High,
                    ..PublishOptions::default()
                },
            )
            .await;

        info!(checkpoint_id, phase = %checkpoint.phase, "state restored from checkpoint");
        Some(checkpoint.state)
    }

    /// The most recent checkpoint
    pub async fn latest(&self) -> Option<Checkpoint> {
        self.memory
            .lock()
            .await
            .iter()
            .max_by_key(|c| c.sequence)
            .cloned()
    }

    /// The most recent checkpoint with the given phase label
    pub async fn by_phase(&self, phase: &str) -> Option<Checkpoint> {
        self.memory
            .lock()
            .await
            .iter()
            .filter(|c| c.phase == phase)
            .max_by_key(|c| c.sequence)
            .cloned()
    }

    /// All checkpoints in sequence order
    pub async fn list(&self) -> Vec<Checkpoint> {
        let mut checkpoints = self.memory.lock().await.clone();
        checkpoints.sort_by_key(|c| c.sequence);
        checkpoints
    }

    /// Trim to the `keep` newest checkpoints across memory, durable store,
    /// and fallback
    ///
    /// Returns the number of checkpoints removed.
    pub async fn cleanup_old(&self, keep: usize) -> usize {
        let removed: Vec<Checkpoint> = {
            let mut memory = self.memory.lock().await;
            if memory.len() <= keep {
                return 0;
            }
            memory.sort_by_key(|c| c.sequence);
            let cut = memory.len() - keep;
            memory.drain(..cut).collect()
        };

        for checkpoint in &removed {
            self.store
                .delete_checkpoint(&self.workflow_id, &checkpoint.id)
                .await;
        }

        debug!(
            workflow_id = %self.workflow_id,
            removed = removed.len(),
            keep,
            "old checkpoints trimmed"
        );
        removed.len()
    }

    /// Trim using the configured retention count
    pub async fn cleanup(&self) -> usize {
        self.cleanup_old(self.config.keep_count).await
    }

    /// Flush fallback-only checkpoints back into the durable store
    ///
    /// Returns the number of records flushed.
    pub async fn reconcile(&self) -> usize {
        self.store.reconcile(&self.workflow_id).await
    }
}
