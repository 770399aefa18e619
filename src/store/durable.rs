//! Durable store trait for events, consensus requests, and checkpoints
//!
//! The hosted backing store is an external collaborator; the core only
//! assumes deterministic-id insert/select/update with no transactional
//! guarantee. Implementations: [`MemoryDurableStore`](super::MemoryDurableStore)
//! and, behind the `rocks-store` feature, a RocksDB tier.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checkpoint::Checkpoint;
use crate::consensus::ConsensusRequest;
use crate::events::{AgentEvent, EventKind};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a durable store
pub type SharedDurableStore = Arc<dyn DurableStore>;

/// Filters for querying persisted events
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Restrict to a single event kind
    pub kind: Option<EventKind>,
    /// Restrict to events published by one agent
    pub agent_code: Option<String>,
    /// Only events at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of events, newest first
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Filter by event kind
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Filter by publishing agent
    pub fn agent(mut self, agent_code: &str) -> Self {
        self.agent_code = Some(agent_code.to_string());
        self
    }

    /// Filter by start instant
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the number of returned events
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a persisted event passes the kind/agent/since filters
    pub fn matches(&self, event: &AgentEvent) -> bool {
        if let Some(ref kind) = self.kind {
            if &event.kind != kind {
                return false;
            }
        }
        if let Some(ref agent) = self.agent_code {
            if &event.agent_code != agent {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Audit row recorded when a validation failure escalates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationAudit {
    /// Agent whose validation failed
    pub agent_code: String,
    /// Directive under validation, if known
    pub directive_id: Option<String>,
    /// Plan under validation, if known
    pub plan_id: Option<String>,
    /// Workflow phase at failure time
    pub phase: Option<String>,
    /// Raw failure details
    pub details: Value,
    /// When the failure was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Append/query store shared process- and cross-process-wide
#[async_trait]
pub trait DurableStore: Send + Sync {
    // =========================================================================
    // Event operations
    // =========================================================================

    /// Append an event
    async fn append_event(&self, event: &AgentEvent) -> StoreResult<()>;

    /// Record an agent's acknowledgment of an event
    async fn acknowledge_event(&self, event_id: &str, agent_code: &str) -> StoreResult<()>;

    /// Query persisted events, newest first
    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<AgentEvent>>;

    // =========================================================================
    // Consensus operations
    // =========================================================================

    /// Insert or update a consensus request by id
    async fn put_request(&self, request: &ConsensusRequest) -> StoreResult<()>;

    /// Fetch a consensus request by id
    async fn get_request(&self, request_id: &str) -> StoreResult<Option<ConsensusRequest>>;

    // =========================================================================
    // Checkpoint operations
    // =========================================================================

    /// Insert a checkpoint by id
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()>;

    /// Fetch a checkpoint by id
    async fn get_checkpoint(&self, checkpoint_id: &str) -> StoreResult<Option<Checkpoint>>;

    /// List checkpoints for a (workflow, agent) pair, ordered by sequence
    async fn list_checkpoints(
        &self,
        workflow_id: &str,
        agent_code: &str,
    ) -> StoreResult<Vec<Checkpoint>>;

    /// Delete a checkpoint by id
    async fn delete_checkpoint(&self, checkpoint_id: &str) -> StoreResult<()>;

    // =========================================================================
    // Audit operations
    // =========================================================================

    /// Record a validation-failure audit row
    async fn record_validation(&self, audit: &ValidationAudit) -> StoreResult<()>;
}
