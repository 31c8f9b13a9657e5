use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered agent able to take assignments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    /// 0.0 = idle, 1.0 = fully loaded
    pub current_load: f64,
    pub status: AgentAvailability,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentAvailability {
    Available,
    Busy,
    Offline,
}

impl std::fmt::Display for AgentAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentAvailability::Available => "available",
            AgentAvailability::Busy => "busy",
            AgentAvailability::Offline => "offline",
        };
        write!(f, "{s}")
    }
}

/// Primary ownership of a task by an agent. At most one per task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub task_id: String,
    pub agent_id: String,
    pub role: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<String>,
}

/// Handoff lifecycle states.
///
/// ```text
///   request          accept              complete
///  ◯ ────────► Requested ────────► Accepted ────────► Completed
///                   └──── reject ────► Rejected (terminal)
/// ```
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffState {
    Requested,
    Accepted,
    Completed,
    Rejected,
}

impl HandoffState {
    /// Check if the handoff can transition to the given state
    pub fn can_transition_to(&self, new_state: HandoffState) -> bool {
        use HandoffState::*;
        matches!(
            (self, new_state),
            (Requested, Accepted) | (Requested, Rejected) | (Accepted, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffState::Completed | HandoffState::Rejected)
    }
}

impl std::fmt::Display for HandoffState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HandoffState::Requested => "requested",
            HandoffState::Accepted => "accepted",
            HandoffState::Completed => "completed",
            HandoffState::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Structured transfer of task ownership between agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handoff {
    pub id: String,
    pub task_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub work_summary: String,
    #[serde(default)]
    pub completed_items: Vec<String>,
    #[serde(default)]
    pub remaining_items: Vec<String>,
    pub state: HandoffState,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// Strategies for resolving a primary-assignment conflict
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    FirstWriterWins,
    LastWriterWins,
    Merge,
    Manual,
}

/// Recorded collision of two primary-assignment writes on one task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentConflict {
    pub id: String,
    pub task_id: String,
    /// Assignment that was in place when the collision happened
    pub incumbent: Assignment,
    /// Assignment whose write collided
    pub challenger: Assignment,
    pub detected_at: DateTime<Utc>,
    pub strategy: Option<ConflictStrategy>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub details: Option<String>,
}

impl AssignmentConflict {
    /// Open conflicts must be surfaced in workflow guidance until resolved
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}
