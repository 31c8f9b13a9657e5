use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categories of workflow hints
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    NextAction,
    BlockerResolution,
    Optimization,
    Completion,
    Collaboration,
}

/// Hint urgency; variant order defines sort order (low first)
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HintPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// On-demand hint produced by the rule engine, optionally persisted for
/// effectiveness analytics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowHint {
    pub id: String,
    pub task_id: String,
    pub kind: HintKind,
    pub priority: HintPriority,
    pub message: String,
    pub suggested_tool: Option<String>,
    /// Ready-to-use parameters for `suggested_tool`
    pub suggested_params: serde_json::Value,
    pub rationale: Option<String>,
    pub confidence: f64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Caller feedback on whether a hint helped
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintFeedback {
    pub hint_id: String,
    pub task_id: String,
    pub was_helpful: bool,
    pub agent_id: Option<String>,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
