//! Phased workflow execution with checkpoint recovery
//!
//! The orchestrator runs one phase at a time, bracketing each executor call
//! with `_START`/`_COMPLETE` checkpoints. A failed phase records an `_ERROR`
//! checkpoint, restores the pre-phase snapshot, and leaves the retry decision
//! to the caller; three failures at the same phase fail the workflow
//! terminally. `resume_workflow` picks up from the newest checkpoint across
//! all registered agents.

pub mod orchestrator;

// Re-export core types
pub use orchestrator::{
    PhaseExecutor, Workflow, WorkflowError, WorkflowOrchestrator, WorkflowResult, WorkflowResume,
    WorkflowState, MAX_PHASE_ATTEMPTS,
};
