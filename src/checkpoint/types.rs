//! Checkpoint record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable snapshot of workflow/agent state at a phase boundary
///
/// Sequence numbers increase strictly within a (workflow, agent) pair, so the
/// newest checkpoint is always unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier
    pub id: String,

    /// Workflow this checkpoint belongs to
    pub workflow_id: String,

    /// Agent that created the checkpoint
    pub agent_code: String,

    /// Phase label, e.g. `BUILD_START` or `BUILD_COMPLETE`
    pub phase: String,

    /// Opaque state snapshot
    pub state: Value,

    /// Metadata such as retry counters
    pub metadata: Value,

    /// Position in the per-(workflow, agent) checkpoint order
    pub sequence: u64,

    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint with a fresh id
    pub fn new(
        workflow_id: impl Into<String>,
        agent_code: impl Into<String>,
        phase: impl Into<String>,
        state: Value,
        metadata: Value,
        sequence: u64,
    ) -> Self {
        Self {
            id: Self::new_id(),
            workflow_id: workflow_id.into(),
            agent_code: agent_code.into(),
            phase: phase.into(),
            state,
            metadata,
            sequence,
            created_at: Utc::now(),
        }
    }

    /// Create a new unique checkpoint id
    pub fn new_id() -> String {
        format!("chk-{}", uuid::Uuid::new_v4())
    }
}
