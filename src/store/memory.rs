//! In-memory durable store
//!
//! Backs single-process deployments and the test suite. Write-failure
//! injection simulates a durable-store outage so the retry/fallback paths can
//! be exercised without a real backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::checkpoint::Checkpoint;
use crate::consensus::ConsensusRequest;
use crate::events::AgentEvent;

use super::durable::{DurableStore, EventQuery, StoreError, StoreResult, ValidationAudit};

/// In-memory implementation of [`DurableStore`]
#[derive(Default)]
pub struct MemoryDurableStore {
    events: RwLock<Vec<AgentEvent>>,
    acks: RwLock<HashMap<String, HashSet<String>>>,
    requests: RwLock<HashMap<String, ConsensusRequest>>,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    audits: RwLock<Vec<ValidationAudit>>,
    fail_writes: AtomicBool,
}

impl MemoryDurableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Toggle write-failure injection
    ///
    /// While enabled, every write returns `StoreError::Unavailable`, the same
    /// observable behavior as an unreachable backend. Reads keep working.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("write failure injected".to_string()))
        } else {
            Ok(())
        }
    }

    /// Number of persisted events
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Agents that acknowledged an event
    pub async fn acknowledgments(&self, event_id: &str) -> Vec<String> {
        let acks = self.acks.read().await;
        let mut agents: Vec<String> = acks
            .get(event_id)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default();
        agents.sort();
        agents
    }

    /// Recorded validation audit rows
    pub async fn validation_audits(&self) -> Vec<ValidationAudit> {
        self.audits.read().await.clone()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn append_event(&self, event: &AgentEvent) -> StoreResult<()> {
        self.check_writable()?;
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn acknowledge_event(&self, event_id: &str, agent_code: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.acks
            .write()
            .await
            .entry(event_id.to_string())
            .or_default()
            .insert(agent_code.to_string());
        Ok(())
    }

    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<AgentEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<AgentEvent> = events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn put_request(&self, request: &ConsensusRequest) -> StoreResult<()> {
        self.check_writable()?;
        self.requests
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get_request(&self, request_id: &str) -> StoreResult<Option<ConsensusRequest>> {
        Ok(self.requests.read().await.get(request_id).cloned())
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        self.check_writable()?;
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> StoreResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(checkpoint_id).cloned())
    }

    async fn list_checkpoints(
        &self,
        workflow_id: &str,
        agent_code: &str,
    ) -> StoreResult<Vec<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        let mut matched: Vec<Checkpoint> = checkpoints
            .values()
            .filter(|c| c.workflow_id == workflow_id && c.agent_code == agent_code)
            .cloned()
            .collect();

        matched.sort_by_key(|c| c.sequence);
        Ok(matched)
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.checkpoints.write().await.remove(checkpoint_id);
        Ok(())
    }

    async fn record_validation(&self, audit: &ValidationAudit) -> StoreResult<()> {
        self.check_writable()?;
        self.audits.write().await.push(audit.clone());
        Ok(())
    }
}
