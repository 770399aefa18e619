//! Conclave — coordination core for autonomous delivery agents
//!
//! This library provides the multi-agent coordination layer of a
//! human/LLM-agent software-delivery workflow:
//!
//! - **Event bus**: per-agent priority-ordered pub/sub with best-effort
//!   durable persistence and a cross-process notification feed
//! - **Consensus manager**: multi-algorithm voting over a target agent set
//!   with weighted votes and dead-man timeout finalization
//! - **Checkpoint manager**: immutable, ordered state snapshots with
//!   three-tier lookup (memory, durable store, local fallback)
//! - **Workflow orchestrator**: sequential phase execution with bounded
//!   retry and checkpoint-driven recovery
//!
//! Every component takes its collaborators by injection — stores and the
//! notification feed are trait objects, and each agent owns its own bus
//! instance. Nothing here is a singleton.
//!
//! # Usage
//!
//! ```ignore
//! use conclave::config::{BusConfig, CheckpointConfig, ConsensusConfig};
//! use conclave::events::{AgentEventBus, EventKind, EventPayload, PublishOptions};
//! use conclave::checkpoint::CheckpointManager;
//! use conclave::consensus::{ConsensusManager, ConsensusOptions, ConsensusType};
//! use conclave::store::{MemoryDurableStore, MemoryFallbackStore, TieredStore};
//!
//! // Wire one agent
//! let durable = MemoryDurableStore::new().shared();
//! let bus = AgentEventBus::new("EXEC", durable.clone(), BusConfig::default()).shared();
//!
//! let tiered = TieredStore::new(durable.clone(), MemoryFallbackStore::new().shared());
//! let checkpoints = CheckpointManager::new(
//!     "wf-1", "EXEC", tiered, bus.clone(), CheckpointConfig::default(),
//! ).shared();
//! bus.attach_checkpoints(checkpoints.clone()).await;
//!
//! let consensus = ConsensusManager::new(
//!     durable, bus.clone(), ConsensusConfig::default(),
//! ).shared();
//! bus.attach_consensus(consensus).await;
//!
//! // Ask the panel
//! let wait = bus.request_consensus(ConsensusOptions::new(
//!     "Proceed with implementation given existing code?",
//!     vec!["LEAD".into(), "PLAN".into(), "SECURITY".into()],
//!     ConsensusType::SimpleMajority,
//! )).await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod consensus;
pub mod events;
pub mod feed;
pub mod store;
pub mod workflow;

// Re-export key event types
pub use events::{
    AgentEvent, AgentEventBus, BusError, BusRegistry, Correlation, EventHandler, EventHistory,
    EventKind, EventPayload, FnHandler, Priority, PublishOptions, SharedAgentEventBus,
    SubscribeOptions,
};

// Re-export key consensus types
pub use consensus::{
    ConsensusError, ConsensusEvaluation, ConsensusManager, ConsensusOptions, ConsensusRequest,
    ConsensusStatus, ConsensusType, ConsensusWait, SharedConsensusManager, Vote, WeightTable,
};

// Re-export key checkpoint and workflow types
pub use checkpoint::{Checkpoint, CheckpointManager, SharedCheckpointManager};
pub use workflow::{
    PhaseExecutor, Workflow, WorkflowError, WorkflowOrchestrator, WorkflowResume, WorkflowState,
};

// Re-export key store and feed types
pub use config::{BusConfig, CheckpointConfig, ConsensusConfig};
pub use feed::{LoopbackFeed, NotificationFeed, SharedNotificationFeed};
pub use store::{
    DurableStore, EventQuery, FallbackStore, MemoryDurableStore, MemoryFallbackStore, RetryPolicy,
    SharedDurableStore, SharedFallbackStore, StoreError, TieredStore, WriteOutcome,
};
