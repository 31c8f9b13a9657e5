use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{HandoffState, TaskStatus};

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Error types for the orchestration engine.
///
/// Every variant maps onto the closed wire-level [`ErrorCode`] taxonomy, and
/// recoverable errors carry enough structure for the hint engine to build a
/// ready-to-use corrective action.
///
/// # Examples
///
/// ```rust
/// use orchestration_core::error::{ErrorCode, OrchestrationError};
///
/// let err = OrchestrationError::task_not_found("task-000042");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// assert!(err.is_recoverable());
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    /// Tool name not present in the dispatch table
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Parameter shape mismatch; lists the offending fields
    #[error("Invalid parameters: {}", .0.join(", "))]
    InvalidParameters(Vec<String>),

    /// Semantic validation failure outside parameter decoding
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found by the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic lock lost; another writer committed first
    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    /// The per-call deadline elapsed before the use-case finished
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Completion attempted without a completion summary
    #[error("Task {0} cannot be completed without a completion_summary")]
    MissingCompletionSummary(String),

    /// Completion attempted while subtasks remain open
    #[error("Task {task_id} has incomplete subtasks: {}", open_subtasks.join(", "))]
    IncompleteSubtasks {
        task_id: String,
        open_subtasks: Vec<String>,
    },

    /// Task status transition outside the lifecycle graph
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// Handoff action outside the handoff state machine
    #[error("Handoff {handoff_id} is {state}; cannot {action}")]
    InvalidHandoffState {
        handoff_id: String,
        state: HandoffState,
        action: String,
    },

    /// Two primary-assignment writes collided on one task
    #[error("Assignment conflict {conflict_id} on task {task_id}")]
    AssignmentConflict {
        task_id: String,
        conflict_id: String,
    },

    /// Requested agent is offline or no agent qualifies
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Referenced vision objective does not exist
    #[error("Vision node missing: {0}")]
    VisionNodeMissing(String),

    /// Alignment cannot be computed (e.g. empty hierarchy)
    #[error("Alignment unavailable: {0}")]
    AlignmentUnavailable(String),

    /// Repository fault that is neither a timeout nor a missing entity
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Closed wire-level error taxonomy carried in `error.code`.
///
/// `StaleContext` is advisory only: it appears in the taxonomy for parsers
/// but no engine path ever fails with it; staleness is surfaced through
/// guidance warnings instead.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownTool,
    InvalidParameters,
    NotFound,
    ConcurrentModification,
    Timeout,
    MissingCompletionSummary,
    IncompleteSubtasks,
    InvalidStateTransition,
    StaleContext,
    InvalidHandoffState,
    AssignmentConflict,
    AgentUnavailable,
    VisionNodeMissing,
    AlignmentUnavailable,
    StorageUnavailable,
}

impl OrchestrationError {
    /// Create a not found error for a task id
    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound(format!("task {id}"))
    }

    /// Create a not found error for an agent id
    pub fn agent_not_found(id: &str) -> Self {
        Self::NotFound(format!("agent {id}"))
    }

    /// Create a not found error for a handoff id
    pub fn handoff_not_found(id: &str) -> Self {
        Self::NotFound(format!("handoff {id}"))
    }

    /// Create a not found error for a conflict id
    pub fn conflict_not_found(id: &str) -> Self {
        Self::NotFound(format!("conflict {id}"))
    }

    /// Create a validation error for a missing or empty field
    pub fn empty_field(field: &str) -> Self {
        Self::InvalidParameters(vec![field.to_string()])
    }

    /// Wire-level error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestrationError::UnknownTool(_) => ErrorCode::UnknownTool,
            OrchestrationError::InvalidParameters(_) | OrchestrationError::Validation(_) => {
                ErrorCode::InvalidParameters
            }
            OrchestrationError::NotFound(_) => ErrorCode::NotFound,
            OrchestrationError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            OrchestrationError::Timeout(_) => ErrorCode::Timeout,
            OrchestrationError::MissingCompletionSummary(_) => ErrorCode::MissingCompletionSummary,
            OrchestrationError::IncompleteSubtasks { .. } => ErrorCode::IncompleteSubtasks,
            OrchestrationError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            OrchestrationError::InvalidHandoffState { .. } => ErrorCode::InvalidHandoffState,
            OrchestrationError::AssignmentConflict { .. } => ErrorCode::AssignmentConflict,
            OrchestrationError::AgentUnavailable(_) => ErrorCode::AgentUnavailable,
            OrchestrationError::VisionNodeMissing(_) => ErrorCode::VisionNodeMissing,
            OrchestrationError::AlignmentUnavailable(_) => ErrorCode::AlignmentUnavailable,
            OrchestrationError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
        }
    }

    /// Short, human-readable pointer toward fixing the failure
    pub fn resolution_hint(&self) -> Option<String> {
        match self {
            OrchestrationError::UnknownTool(_) => {
                Some("List the available tools and retry with one of them".to_string())
            }
            OrchestrationError::InvalidParameters(fields) => Some(format!(
                "Supply valid values for: {}",
                fields.join(", ")
            )),
            OrchestrationError::Validation(_) => {
                Some("Correct the rejected value and retry".to_string())
            }
            OrchestrationError::ConcurrentModification(_) => {
                Some("Re-read the task and retry the mutation".to_string())
            }
            OrchestrationError::Timeout(_) => Some("Retry the call".to_string()),
            OrchestrationError::MissingCompletionSummary(_) => Some(
                "Retry with a completion_summary describing what was accomplished".to_string(),
            ),
            OrchestrationError::IncompleteSubtasks { open_subtasks, .. } => Some(format!(
                "Complete the open subtasks first: {}",
                open_subtasks.join(", ")
            )),
            OrchestrationError::InvalidStateTransition { from, .. } => Some(format!(
                "Move the task out of '{from}' through an intermediate status"
            )),
            OrchestrationError::InvalidHandoffState { state, .. } => Some(format!(
                "The handoff is '{state}'; only transitions allowed by the handoff protocol apply"
            )),
            OrchestrationError::AssignmentConflict { conflict_id, .. } => Some(format!(
                "Call resolve_conflict with conflict_id={conflict_id} and a strategy"
            )),
            OrchestrationError::AgentUnavailable(_) => {
                Some("Pick an available agent or retry once the agent is back".to_string())
            }
            OrchestrationError::NotFound(_)
            | OrchestrationError::VisionNodeMissing(_)
            | OrchestrationError::AlignmentUnavailable(_)
            | OrchestrationError::StorageUnavailable(_) => None,
        }
    }

    /// Whether the caller can fix this failure by issuing a corrected call
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, OrchestrationError::StorageUnavailable(_))
    }

    /// Check if this error indicates a not found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrchestrationError::NotFound(_))
    }

    /// Check if this error indicates a concurrency loss
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, OrchestrationError::ConcurrentModification(_))
    }
}
