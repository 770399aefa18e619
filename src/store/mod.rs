//! Persistence seams for the coordination core
//!
//! The core consumes two storage collaborators, both injected as trait
//! objects:
//!
//! - [`DurableStore`]: the shared append/query backend for events, consensus
//!   requests, and checkpoints. No transactional guarantee is assumed —
//!   concurrent writers are last-write-wins.
//! - [`FallbackStore`]: a local scoped key-value store that absorbs
//!   checkpoint writes while the durable store is unreachable.
//!
//! [`TieredStore`] is the façade the checkpoint manager writes through:
//! durable first with a bounded retry, fallback second, and a `reconcile`
//! pass that flushes fallback-only records once the durable store recovers.
//!
//! # Usage
//!
//! ```ignore
//! use conclave::store::{MemoryDurableStore, MemoryFallbackStore, TieredStore};
//!
//! let durable = MemoryDurableStore::new().shared();
//! let fallback = MemoryFallbackStore::new().shared();
//! let tiered = TieredStore::new(durable.clone(), fallback);
//!
//! let outcome = tiered.write_checkpoint(&checkpoint).await;
//! let flushed = tiered.reconcile("wf-1").await;
//! ```

pub mod durable;
pub mod fallback;
pub mod memory;
#[cfg(feature = "rocks-store")]
pub mod rocks;
pub mod tiered;

// Re-export core types
pub use durable::{
    DurableStore, EventQuery, SharedDurableStore, StoreError, StoreResult, ValidationAudit,
};
pub use fallback::{FallbackStore, MemoryFallbackStore, SharedFallbackStore};
pub use memory::MemoryDurableStore;
#[cfg(feature = "rocks-store")]
pub use rocks::RocksDurableStore;
pub use tiered::{RetryPolicy, TieredStore, WriteOutcome};
