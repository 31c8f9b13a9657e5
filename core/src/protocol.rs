//! Wire contract of the tool surface: parameter shapes and the uniform
//! response envelope. Parameter names are stable; they are the protocol.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ErrorCode, OrchestrationError},
    guidance::WorkflowGuidance,
    models::{
        AgentAvailability, ConflictStrategy, HintKind, Milestone, Priority, ProgressType,
        SnapshotMetadata, TaskStatus,
    },
};

/// Uniform response envelope. Failed replies are shaped exactly like
/// successful ones apart from `success=false`; guidance is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    pub workflow_guidance: WorkflowGuidance,
}

/// Wire-level error payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_hint: Option<String>,
}

impl ToolResponse {
    pub fn ok(data: Value, workflow_guidance: WorkflowGuidance) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            workflow_guidance,
        }
    }

    pub fn failed(error: &OrchestrationError, workflow_guidance: WorkflowGuidance) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                code: error.code(),
                message: error.to_string(),
                resolution_hint: error.resolution_hint(),
            }),
            workflow_guidance,
        }
    }
}

/// Actions of the `manage_task` tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Create,
    Get,
    Update,
    Complete,
    Next,
    List,
    Search,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageTaskParams {
    pub action: TaskAction,
    pub task_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub branch_id: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub milestones: Option<Vec<Milestone>>,
    pub completion_summary: Option<String>,
    /// Search query for `action=search`
    pub query: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Attach vision enrichment on `action=get`; engine default when absent
    pub include_vision: Option<bool>,
}

/// Actions of the `manage_subtask` tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskAction {
    Create,
    Update,
    Complete,
    Delete,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageSubtaskParams {
    pub action: SubtaskAction,
    /// Parent task id
    pub task_id: String,
    pub subtask_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub completion_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskParams {
    pub task_id: String,
    pub completion_summary: String,
    pub testing_notes: Option<String>,
    #[serde(default)]
    pub next_recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteSubtaskParams {
    /// Parent task id
    pub task_id: String,
    pub subtask_id: String,
    pub completion_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProgressParams {
    pub task_id: String,
    pub progress_type: ProgressType,
    pub description: String,
    pub percentage: Option<u8>,
    pub metadata: Option<SnapshotMetadata>,
    pub agent_id: Option<String>,
    /// Optional per-type weights for the overall mean; equal when absent
    pub weights: Option<HashMap<ProgressType, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickTaskUpdateParams {
    pub task_id: String,
    pub what_i_did: String,
    pub progress_percentage: u8,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointWorkParams {
    pub task_id: String,
    pub current_state: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkflowHintsParams {
    pub task_id: String,
    pub hint_types: Option<Vec<HintKind>>,
    pub max_hints: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvideHintFeedbackParams {
    pub hint_id: String,
    pub task_id: String,
    pub was_helpful: bool,
    pub agent_id: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignAgentParams {
    pub task_id: String,
    /// Agent id, or "auto" to let the coordinator pick
    pub agent_id: String,
    pub role: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    pub assigned_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHandoffParams {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub task_id: String,
    pub work_summary: String,
    #[serde(default)]
    pub completed_items: Vec<String>,
    #[serde(default)]
    pub remaining_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffActionParams {
    pub handoff_id: String,
    pub agent_id: Option<String>,
    /// Recorded on rejection
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAgentWorkloadParams {
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConflictParams {
    pub conflict_id: String,
    pub strategy: ConflictStrategy,
    pub resolved_by: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastStatusParams {
    pub agent_id: String,
    pub status: AgentAvailability,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVisionAlignmentParams {
    pub task_id: String,
}

/// Decode raw parameters into a typed shape, converting serde failures
/// into `INVALID_PARAMETERS` with the offending field when extractable
pub fn decode_params<T: serde::de::DeserializeOwned>(
    raw: Value,
) -> Result<T, OrchestrationError> {
    serde_json::from_value(raw).map_err(|e| {
        let message = e.to_string();
        let field = message
            .split('`')
            .nth(1)
            .map(str::to_string)
            .unwrap_or(message);
        OrchestrationError::InvalidParameters(vec![field])
    })
}
