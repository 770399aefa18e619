//! Core types for consensus voting

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Correlation;

/// Vote option accepted as approval
pub const VOTE_APPROVE: &str = "APPROVE";

/// Vote option counted as rejection
pub const VOTE_REJECT: &str = "REJECT";

/// Vote option excluded from the approval ratio
pub const VOTE_ABSTAIN: &str = "ABSTAIN";

/// Wildcard target set admitting any voter
pub const ALL_AGENTS: &str = "ALL";

/// Voting algorithm applied when evaluating a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusType {
    /// Approvals over non-abstain votes must exceed 0.5
    SimpleMajority,
    /// Approvals over non-abstain votes must reach 0.66
    SuperMajority,
    /// Every non-abstain vote must approve
    Unanimous,
    /// Approval weight over non-abstain weight must exceed 0.5
    Weighted,
    /// Simple majority, evaluated only once the quorum ratio is met
    Quorum,
}

impl std::fmt::Display for ConsensusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusType::SimpleMajority => write!(f, "SIMPLE_MAJORITY"),
            ConsensusType::SuperMajority => write!(f, "SUPER_MAJORITY"),
            ConsensusType::Unanimous => write!(f, "UNANIMOUS"),
            ConsensusType::Weighted => write!(f, "WEIGHTED"),
            ConsensusType::Quorum => write!(f, "QUORUM"),
        }
    }
}

/// Lifecycle status of a consensus request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusStatus {
    /// Voting window open
    Pending,
    /// Finalized with consensus reached
    Approved,
    /// Finalized without consensus
    Rejected,
}

impl ConsensusStatus {
    /// Whether the request has been finalized
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConsensusStatus::Pending)
    }
}

impl std::fmt::Display for ConsensusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusStatus::Pending => write!(f, "PENDING"),
            ConsensusStatus::Approved => write!(f, "APPROVED"),
            ConsensusStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A single agent's recorded vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// The chosen option
    pub vote: String,
    /// The voter's weight at cast time
    pub weight: f64,
    /// Optional rationale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the vote was cast
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    /// Whether this vote counts as approval
    pub fn is_approval(&self) -> bool {
        self.vote == VOTE_APPROVE
    }

    /// Whether this vote abstains from the decision
    pub fn is_abstain(&self) -> bool {
        self.vote == VOTE_ABSTAIN
    }
}

/// A voting round over a target agent set
///
/// Mutated only by vote casting until finalized exactly once; retained in the
/// durable store after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRequest {
    /// Unique request identifier
    pub id: String,

    /// The question put to the agents
    pub question: String,

    /// Agents allowed to vote; `["ALL"]` admits any voter
    pub target_agents: Vec<String>,

    /// Voting algorithm
    pub consensus_type: ConsensusType,

    /// Vote options a cast must use
    pub allowed_options: Vec<String>,

    /// Approval ratio required to reach consensus (0..1)
    pub threshold: f64,

    /// Voting window in milliseconds
    pub timeout_ms: u64,

    /// Participation ratio required before finalizing on votes (0..1)
    pub min_participation: f64,

    /// Participation ratio gating `ConsensusType::Quorum` evaluation
    pub quorum: f64,

    /// Votes by agent code
    pub votes: BTreeMap<String, Vote>,

    /// Lifecycle status
    pub status: ConsensusStatus,

    /// Governance records this request concerns
    #[serde(default)]
    pub correlation: Correlation,

    /// When the request was created
    pub created_at: DateTime<Utc>,

    /// When the request was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ConsensusRequest {
    /// Create a new unique request id
    pub fn new_id() -> String {
        format!("consensus-{}", uuid::Uuid::new_v4())
    }

    /// Whether the target set admits any voter
    pub fn is_open_panel(&self) -> bool {
        self.target_agents.iter().any(|a| a == ALL_AGENTS)
    }

    /// Whether an agent is allowed to vote on this request
    pub fn authorizes(&self, agent_code: &str) -> bool {
        self.is_open_panel() || self.target_agents.iter().any(|a| a == agent_code)
    }

    /// Whether an agent already voted
    pub fn has_voted(&self, agent_code: &str) -> bool {
        self.votes.contains_key(agent_code)
    }

    /// Whether a vote option is in the allowed set
    pub fn allows_option(&self, vote: &str) -> bool {
        self.allowed_options.iter().any(|o| o == vote)
    }

    /// Number of expected voters
    ///
    /// An open panel has no fixed membership, so the count of votes actually
    /// cast stands in for it.
    pub fn target_count(&self) -> usize {
        if self.is_open_panel() {
            self.votes.len()
        } else {
            self.target_agents.len()
        }
    }
}

/// Options for creating a consensus request
///
/// Fields left unset fall back to the manager's `ConsensusConfig` defaults.
#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    /// The question put to the agents
    pub question: String,
    /// Agents allowed to vote; `["ALL"]` admits any voter
    pub target_agents: Vec<String>,
    /// Voting algorithm
    pub consensus_type: ConsensusType,
    /// Vote options, defaulting to APPROVE/REJECT/ABSTAIN
    pub options: Option<Vec<String>>,
    /// Approval threshold (0..1)
    pub threshold: Option<f64>,
    /// Voting window
    pub timeout: Option<Duration>,
    /// Minimum participation ratio (0..1)
    pub min_participation: Option<f64>,
    /// Quorum ratio for `ConsensusType::Quorum`
    pub quorum: Option<f64>,
    /// Governance records this request concerns
    pub correlation: Correlation,
}

impl ConsensusOptions {
    /// Create options for a question over a target set
    pub fn new(
        question: impl Into<String>,
        target_agents: Vec<String>,
        consensus_type: ConsensusType,
    ) -> Self {
        Self {
            question: question.into(),
            target_agents,
            consensus_type,
            options: None,
            threshold: None,
            timeout: None,
            min_participation: None,
            quorum: None,
            correlation: Correlation::default(),
        }
    }

    /// Set the allowed vote options
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the approval threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    /// Set the voting window
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the minimum participation ratio
    pub fn with_min_participation(mut self, min_participation: f64) -> Self {
        self.min_participation = Some(min_participation.clamp(0.0, 1.0));
        self
    }

    /// Set the quorum ratio
    pub fn with_quorum(mut self, quorum: f64) -> Self {
        self.quorum = Some(quorum.clamp(0.0, 1.0));
        self
    }

    /// Set the correlation
    pub fn with_correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }
}

/// Snapshot of where a request stands after an evaluation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusEvaluation {
    /// Votes cast over expected voters
    pub participation: f64,
    /// Approvals over non-abstain votes (weight ratio for `Weighted`)
    pub approval_rate: f64,
    /// Number of votes cast
    pub votes_cast: usize,
    /// Number of expected voters
    pub target_count: usize,
    /// Whether participation clears `min_participation`
    pub meets_participation: bool,
    /// Whether the algorithm rule, the threshold, and participation all hold
    pub reached: bool,
}

/// Result of waiting on a consensus request
#[derive(Debug, Clone)]
pub enum ConsensusWait {
    /// The request finalized within the wait window
    Resolved {
        /// Whether consensus was reached
        reached: bool,
        /// The recorded votes
        votes: BTreeMap<String, Vote>,
        /// Terminal status
        status: ConsensusStatus,
    },
    /// The wait window elapsed without finalization
    TimedOut,
}

impl ConsensusWait {
    /// Whether consensus was reached
    pub fn reached(&self) -> bool {
        matches!(self, ConsensusWait::Resolved { reached: true, .. })
    }
}

/// Voting weights by agent code
///
/// Security-class agents carry 2.0, validation-class 1.5, everyone else the
/// default 1.0.
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("SECURITY".to_string(), 2.0);
        weights.insert("VALIDATION".to_string(), 1.5);
        Self {
            weights,
            default_weight: 1.0,
        }
    }
}

impl WeightTable {
    /// Override the weight for an agent
    pub fn with_weight(mut self, agent_code: &str, weight: f64) -> Self {
        self.weights.insert(agent_code.to_string(), weight);
        self
    }

    /// Weight applied to an agent's votes
    pub fn weight_for(&self, agent_code: &str) -> f64 {
        self.weights
            .get(agent_code)
            .copied()
            .unwrap_or(self.default_weight)
    }
}
