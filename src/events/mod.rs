//! Event-driven coordination for delivery agents
//!
//! Pub/sub messaging between agents with priority-ordered dispatch,
//! best-effort durable persistence, and a cross-process notification feed.
//!
//! # Architecture
//!
//! 1. **Event types** (`types.rs`): the closed set of event kinds and the
//!    tagged payload union that drive coordination.
//!
//! 2. **Agent event bus** (`bus.rs`): one instance per agent. Local
//!    subscribers are dispatched in strict priority order; durable appends
//!    retry a bounded number of times and then buffer locally, so publishing
//!    never fails on a store outage.
//!
//! 3. **History** (`history.rs`): queries over the persisted log and the
//!    [`BusRegistry`] aggregating per-agent buses.
//!
//! # Event flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Publisher  │────▶│  Agent Bus   │────▶│  Subscribers │
//! │  (publish)   │     │ (prio drain) │     │  (handlers)  │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                  ┌──────────┴──────────┐
//!                  ▼                     ▼
//!           ┌──────────────┐     ┌──────────────┐
//!           │ DurableStore │     │ Notification │
//!           │ (retry+buf)  │     │     Feed     │
//!           └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use conclave::events::{AgentEventBus, EventKind, EventPayload, PublishOptions};
//!
//! let bus = AgentEventBus::new("VALIDATION", store, config).shared();
//!
//! bus.subscribe(EventKind::FindingDetected, handler, Default::default()).await;
//!
//! bus.publish(
//!     EventKind::FindingDetected,
//!     "Found existing dashboard implementation",
//!     EventPayload::Finding {
//!         description: "duplicate implementation".into(),
//!         confidence: 0.95,
//!         detail: serde_json::json!({"location": "src/components"}),
//!     },
//!     PublishOptions::default(),
//! ).await;
//! ```

pub mod bus;
pub mod history;
pub mod types;

// Re-export core types
pub use bus::{
    AgentEventBus, BusError, BusResult, EventHandler, FilterFn, FnHandler, PublishOptions,
    SharedAgentEventBus, SubscribeOptions,
};
pub use history::{BusRegistry, EventHistory};
pub use types::{
    AgentEvent, Correlation, EventId, EventKind, EventPayload, Priority, SubscriptionId,
};
