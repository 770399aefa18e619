//! Checkpoint creation and recovery
//!
//! Immutable, ordered state snapshots per (workflow, agent). Writes degrade
//! from the durable store to the local fallback to memory-only and never fail
//! the caller; restores walk the three tiers in that order and report a miss
//! as `None`.

pub mod manager;
pub mod types;

// Re-export core types
pub use manager::{CheckpointManager, SharedCheckpointManager};
pub use types::Checkpoint;
