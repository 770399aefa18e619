//! Multi-algorithm consensus voting between agents
//!
//! A [`ConsensusManager`] tracks voting rounds over a target agent set.
//! Requests broadcast to their targets over the event bus at high priority,
//! collect weighted votes, and finalize exactly once — when the votes decide
//! the outcome or when the dead-man timeout fires, whichever comes first.
//!
//! # Algorithms
//!
//! | Type | Rule |
//! |---|---|
//! | `SimpleMajority` | approvals / non-abstain votes > 0.5 |
//! | `SuperMajority`  | same ratio ≥ 0.66 |
//! | `Unanimous`      | every non-abstain vote approves |
//! | `Weighted`       | approval weight / non-abstain weight > 0.5 |
//! | `Quorum`         | simple majority once participation ≥ quorum |
//!
//! A request only finalizes as approved when the algorithm rule holds, the
//! approval rate clears the request threshold, and participation clears the
//! minimum. Participation is always measured against the request's own target
//! count.

pub mod manager;
pub mod types;

// Re-export core types
pub use manager::{
    ConsensusError, ConsensusManager, ConsensusResult, FinalizeCause, SharedConsensusManager,
};
pub use types::{
    ConsensusEvaluation, ConsensusOptions, ConsensusRequest, ConsensusStatus, ConsensusType,
    ConsensusWait, Vote, WeightTable, ALL_AGENTS, VOTE_ABSTAIN, VOTE_APPROVE, VOTE_REJECT,
};
