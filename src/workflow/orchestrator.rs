//! Workflow orchestrator
//!
//! Drives phased work over a checkpoint manager: checkpoint before and after
//! every phase, restore the pre-phase snapshot on failure, and give up for
//! good after three attempts at the same phase. Recovery restores state only;
//! re-invoking the executor is the caller's decision.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, SharedCheckpointManager};

/// Attempts permitted at a single phase before the workflow fails terminally
pub const MAX_PHASE_ATTEMPTS: u64 = 3;

/// Error type for workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("phase {phase} failed on attempt {attempt}: {error}")]
    PhaseFailed {
        phase: String,
        attempt: u64,
        error: String,
    },

    #[error("phase {phase} exhausted its {attempts} attempts")]
    RetryExhausted { phase: String, attempts: u64 },
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Execution state of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Created, no phase has run
    Initialized,
    /// A phase executor is running
    Executing,
    /// The last phase completed
    PhaseComplete,
    /// The last phase failed; state was restored from the pre-phase checkpoint
    PhaseFailed,
    /// A phase exhausted its attempts
    Failed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Initialized => write!(f, "initialized"),
            WorkflowState::Executing => write!(f, "executing"),
            WorkflowState::PhaseComplete => write!(f, "phase_complete"),
            WorkflowState::PhaseFailed => write!(f, "phase_failed"),
            WorkflowState::Failed => write!(f, "failed"),
        }
    }
}

/// A phased unit of delivery work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: String,

    /// Ordered phase labels
    pub phases: Vec<String>,

    /// Index of the phase to run next
    pub current_phase: usize,

    /// Execution state
    pub state: WorkflowState,
}

impl Workflow {
    /// Create a workflow over an ordered phase list
    pub fn new(id: impl Into<String>, phases: Vec<String>) -> Self {
        Self {
            id: id.into(),
            phases,
            current_phase: 0,
            state: WorkflowState::Initialized,
        }
    }

    /// Label of the phase to run next, if any remain
    pub fn current_phase_label(&self) -> Option<&str> {
        self.phases.get(self.current_phase).map(String::as_str)
    }

    /// Whether every phase has completed
    ///
    /// There is no separate terminal state for success; exhausting the phase
    /// list is completion.
    pub fn is_complete(&self) -> bool {
        self.current_phase >= self.phases.len()
    }
}

/// Executes a single workflow phase over the current state
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    /// Run the phase, returning the next state snapshot
    async fn run(&self, state: Value) -> anyhow::Result<Value>;
}

/// Where a workflow picked up after `resume_workflow`
#[derive(Debug, Clone)]
pub struct WorkflowResume {
    /// The checkpoint the workflow resumed from
    pub checkpoint: Checkpoint,
    /// The restored state snapshot
    pub state: Value,
    /// Label of the phase to run next, if any remain
    pub next_phase: Option<String>,
}

/// Sequential phase driver built on checkpoint recovery
pub struct WorkflowOrchestrator {
    workflow: Mutex<Workflow>,
    checkpoints: SharedCheckpointManager,
    agents: Mutex<HashMap<String, SharedCheckpointManager>>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator for a workflow, driven by one agent's
    /// checkpoint manager
    pub fn new(workflow: Workflow, checkpoints: SharedCheckpointManager) -> Self {
        let mut agents = HashMap::new();
        agents.insert(checkpoints.agent_code().to_string(), checkpoints.clone());
        Self {
            workflow: Mutex::new(workflow),
            checkpoints,
            agents: Mutex::new(agents),
        }
    }

    /// Register another agent's checkpoint manager for resume scans
    pub async fn register_agent(&self, manager: SharedCheckpointManager) {
        self.agents
            .lock()
            .await
            .insert(manager.agent_code().to_string(), manager);
    }

    /// Snapshot of the workflow record
    pub async fn workflow(&self) -> Workflow {
        self.workflow.lock().await.clone()
    }

    /// Run one phase to completion
    ///
    /// Creates a `<phase>_START` checkpoint, invokes the executor, and
    /// creates `<phase>_COMPLETE` on success. On failure it records
    /// `<phase>_ERROR`, restores the pre-phase checkpoint, and returns
    /// `PhaseFailed`; the caller decides whether to call again. After
    /// [`MAX_PHASE_ATTEMPTS`] failures the workflow fails terminally.
    pub async fn execute_phase(
        &self,
        phase: &str,
        executor: &dyn PhaseExecutor,
        state: Value,
    ) -> WorkflowResult<Value> {
        let attempts = self.failed_attempts(phase).await;
        if attempts >= MAX_PHASE_ATTEMPTS {
            self.set_state(WorkflowState::Failed).await;
            warn!(phase, attempts, "phase retry budget exhausted");
            return Err(WorkflowError::RetryExhausted {
                phase: phase.to_string(),
                attempts,
            });
        }
        let attempt = attempts + 1;

        {
            let mut workflow = self.workflow.lock().await;
            workflow.state = WorkflowState::Executing;
            if let Some(index) = workflow.phases.iter().position(|p| p == phase) {
                workflow.current_phase = index;
            }
        }

        let start = self
            .checkpoints
            .create_checkpoint(
                &format!("{}_START", phase),
                state.clone(),
                json!({ "attempt": attempt }),
            )
            .await;

        debug!(phase, attempt, "phase executor starting");

        match executor.run(state).await {
            Ok(next_state) => {
                self.checkpoints
                    .create_checkpoint(
                        &format!("{}_COMPLETE", phase),
                        next_state.clone(),
                        json!({ "attempt": attempt }),
                    )
                    .await;

                let mut workflow = self.workflow.lock().await;
                workflow.state = WorkflowState::PhaseComplete;
                if let Some(index) = workflow.phases.iter().position(|p| p == phase) {
                    workflow.current_phase = index + 1;
                }

                info!(phase, attempt, "phase complete");
                Ok(next_state)
            }
            Err(error) => {
                self.checkpoints
                    .create_checkpoint(
                        &format!("{}_ERROR", phase),
                        json!({ "error": error.to_string() }),
                        json!({ "attempts": attempt }),
                    )
                    .await;

                // State-only recovery; the executor is not re-invoked
                let _restored = self.checkpoints.restore(&start.id).await;
                self.set_state(WorkflowState::PhaseFailed).await;

                warn!(phase, attempt, "phase failed, pre-phase state restored: {}", error);
                Err(WorkflowError::PhaseFailed {
                    phase: phase.to_string(),
                    attempt,
                    error: error.to_string(),
                })
            }
        }
    }

    /// Resume from the most recent checkpoint across all registered agents
    ///
    /// Restores that checkpoint's state and advances `current_phase` to the
    /// phase following the one its label implies. Returns `None` when no
    /// agent holds a checkpoint.
    pub async fn resume_workflow(&self) -> Option<WorkflowResume> {
        let managers: Vec<SharedCheckpointManager> =
            self.agents.lock().await.values().cloned().collect();
        let latests =
            futures::future::join_all(managers.iter().map(|manager| manager.latest())).await;

        let mut newest: Option<(SharedCheckpointManager, Checkpoint)> = None;
        for (manager, latest) in managers.iter().zip(latests) {
            if let Some(checkpoint) = latest {
                let newer = match &newest {
                    Some((_, current)) => checkpoint.created_at > current.created_at,
                    None => true,
                };
                if newer {
                    newest = Some((manager.clone(), checkpoint));
                }
            }
        }

        let (manager, checkpoint) = newest?;
        let state = manager.restore(&checkpoint.id).await?;

        let base = base_phase(&checkpoint.phase);
        let next_phase = {
            let mut workflow = self.workflow.lock().await;
            workflow.state = WorkflowState::Executing;
            match workflow.phases.iter().position(|p| p == base) {
                Some(index) => {
                    workflow.current_phase = index + 1;
                    workflow.phases.get(index + 1).cloned()
                }
                None => {
                    warn!(label = %checkpoint.phase, "checkpoint phase not in workflow phase list");
                    None
                }
            }
        };

        info!(
            checkpoint_id = %checkpoint.id,
            agent = %checkpoint.agent_code,
            next_phase = next_phase.as_deref().unwrap_or("-"),
            "workflow resumed"
        );

        Some(WorkflowResume {
            checkpoint,
            state,
            next_phase,
        })
    }

    /// Failed attempts recorded against a phase, from `<phase>_ERROR`
    /// checkpoint metadata
    async fn failed_attempts(&self, phase: &str) -> u64 {
        self.checkpoints
            .by_phase(&format!("{}_ERROR", phase))
            .await
            .and_then(|c| c.metadata.get("attempts").and_then(Value::as_u64))
            .unwrap_or(0)
    }

    async fn set_state(&self, state: WorkflowState) {
        self.workflow.lock().await.state = state;
    }
}

/// Strip the `_START`/`_COMPLETE`/`_ERROR` suffix from a checkpoint label
fn base_phase(label: &str) -> &str {
    label
        .strip_suffix("_START")
        .or_else(|| label.strip_suffix("_COMPLETE"))
        .or_else(|| label.strip_suffix("_ERROR"))
        .unwrap_or(label)
}
