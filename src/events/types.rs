//! Event types for agent coordination
//!
//! Events are the only way agents observe each other. Each event carries a
//! closed `EventKind` for subscription matching and a tagged `EventPayload`
//! union for structured data, with `Other` escape hatches on both so
//! collaborators can introduce kinds this crate does not know about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for events
pub type EventId = String;

/// Unique identifier for subscriptions
pub type SubscriptionId = String;

/// Dispatch priority, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Immediate action required
    Critical,
    /// Important but not blocking
    High,
    /// Standard priority
    Medium,
    /// Informational
    Low,
}

impl Priority {
    /// Numeric rank for ordering, lower dispatches first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "CRITICAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

/// Structured event categorization
///
/// Known kinds are a closed set; anything else round-trips through
/// `Other(raw)` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    // Lifecycle
    AnalysisStart,
    AnalysisComplete,

    // Discovery
    FindingDetected,
    PatternIdentified,

    // Validation
    ValidationPassed,
    ValidationFailed,

    // Coordination
    HandoffCreated,
    ConsensusRequired,
    ConsensusResolved,
    HumanReviewRequired,

    // System
    Error,
    Warning,
    Checkpoint,
    Recovery,

    /// Forward-compatibility escape hatch for kinds this crate predates
    #[serde(untagged)]
    Other(String),
}

impl EventKind {
    /// Wire label for this kind
    pub fn label(&self) -> &str {
        match self {
            EventKind::AnalysisStart => "ANALYSIS_START",
            EventKind::AnalysisComplete => "ANALYSIS_COMPLETE",
            EventKind::FindingDetected => "FINDING_DETECTED",
            EventKind::PatternIdentified => "PATTERN_IDENTIFIED",
            EventKind::ValidationPassed => "VALIDATION_PASSED",
            EventKind::ValidationFailed => "VALIDATION_FAILED",
            EventKind::HandoffCreated => "HANDOFF_CREATED",
            EventKind::ConsensusRequired => "CONSENSUS_REQUIRED",
            EventKind::ConsensusResolved => "CONSENSUS_RESOLVED",
            EventKind::HumanReviewRequired => "HUMAN_REVIEW_REQUIRED",
            EventKind::Error => "ERROR",
            EventKind::Warning => "WARNING",
            EventKind::Checkpoint => "CHECKPOINT",
            EventKind::Recovery => "RECOVERY",
            EventKind::Other(label) => label,
        }
    }

    /// Whether this kind takes the immediate escalation path during a drain
    pub fn is_escalating(&self) -> bool {
        matches!(
            self,
            EventKind::ValidationFailed | EventKind::HumanReviewRequired | EventKind::Error
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Links an event back to the governance records it concerns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Strategic directive this event relates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive_id: Option<String>,
    /// Delivery plan this event relates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Workflow phase active when the event was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Correlation {
    /// Correlation scoped to a directive
    pub fn directive(directive_id: &str) -> Self {
        Self {
            directive_id: Some(directive_id.to_string()),
            ..Self::default()
        }
    }

    /// Set the plan id
    pub fn with_plan(mut self, plan_id: &str) -> Self {
        self.plan_id = Some(plan_id.to_string());
        self
    }

    /// Set the phase
    pub fn with_phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_string());
        self
    }
}

/// Structured payload variants for the kinds the core itself emits and
/// consumes; everything else rides in `Other`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPayload {
    /// Analysis lifecycle details
    Analysis {
        summary: String,
        #[serde(default)]
        detail: Value,
    },

    /// A discovery worth other agents' attention
    Finding {
        description: String,
        confidence: f64,
        #[serde(default)]
        detail: Value,
    },

    /// Outcome of a validation gate
    Validation {
        passed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default)]
        results: Value,
    },

    /// Work handed from one agent to another
    Handoff {
        from_agent: String,
        to_agent: String,
        #[serde(default)]
        artifacts: Value,
    },

    /// Broadcast announcing a consensus request to its target agents
    ConsensusBroadcast {
        request_id: String,
        question: String,
        options: Vec<String>,
        timeout_ms: u64,
        threshold: f64,
    },

    /// Broadcast announcing a finalized consensus decision
    ConsensusOutcome {
        request_id: String,
        approved: bool,
        approval_rate: f64,
        participation: f64,
    },

    /// A checkpoint was created
    CheckpointNotice {
        checkpoint_id: String,
        workflow_id: String,
        phase: String,
        sequence: u64,
    },

    /// State was restored from a checkpoint
    RecoveryNotice {
        checkpoint_id: String,
        workflow_id: String,
        phase: String,
    },

    /// A fault report, optionally pointing at a checkpoint to recover from
    Fault {
        message: String,
        recoverable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkpoint_id: Option<String>,
    },

    /// Raw payload for kinds the core does not model
    #[serde(untagged)]
    Other(Value),
}

impl EventPayload {
    /// Empty opaque payload
    pub fn none() -> Self {
        EventPayload::Other(Value::Null)
    }
}

/// An immutable coordination event
///
/// Created by `AgentEventBus::publish` and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event identifier
    pub id: EventId,

    /// Publication timestamp
    pub timestamp: DateTime<Utc>,

    /// Agent that published the event
    pub agent_code: String,

    /// Event categorization
    pub kind: EventKind,

    /// Human-readable description of what happened
    pub action: String,

    /// Structured payload
    pub payload: EventPayload,

    /// Dispatch priority
    pub priority: Priority,

    /// Agents this event targets; empty means broadcast
    #[serde(default)]
    pub target_agents: Vec<String>,

    /// Whether receiving agents must acknowledge receipt
    #[serde(default)]
    pub requires_ack: bool,

    /// Governance records this event concerns
    #[serde(default)]
    pub correlation: Correlation,
}

impl AgentEvent {
    /// Create a new unique event id
    pub fn new_id() -> EventId {
        format!("evt-{}", uuid::Uuid::new_v4())
    }

    /// Whether this event should be delivered to the given agent
    ///
    /// An empty target set is a broadcast.
    pub fn matches_target(&self, agent_code: &str) -> bool {
        self.target_agents.is_empty() || self.target_agents.iter().any(|a| a == agent_code)
    }
}
