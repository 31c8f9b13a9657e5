//! Deterministic workflow guidance attached to every dispatcher reply.
//!
//! The engine is a fixed, ordered list of pure rules over request-scoped
//! state. Identical state (including the request timestamp) produces
//! byte-identical output, which the snapshot tests rely on.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::OrchestrationError,
    models::{
        AssignmentConflict, HintKind, HintPriority, Task, TaskContext, TaskStatus,
        VisionAlignment, WorkflowHint,
    },
};

/// Workflow phase derived from task state
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Execution,
    Blocked,
    Review,
    Completion,
    Done,
    Cancelled,
    Unknown,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Planning,
        Phase::Execution,
        Phase::Blocked,
        Phase::Review,
        Phase::Completion,
        Phase::Done,
        Phase::Cancelled,
        Phase::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Blocked => "blocked",
            Phase::Review => "review",
            Phase::Completion => "completion",
            Phase::Done => "done",
            Phase::Cancelled => "cancelled",
            Phase::Unknown => "unknown",
        }
    }

    fn derive(task: Option<&Task>) -> Phase {
        let Some(task) = task else {
            return Phase::Unknown;
        };
        match task.status {
            TaskStatus::Todo => Phase::Planning,
            TaskStatus::InProgress if task.overall_progress >= 80 => Phase::Completion,
            TaskStatus::InProgress => Phase::Execution,
            TaskStatus::Blocked => Phase::Blocked,
            TaskStatus::Review => Phase::Review,
            TaskStatus::Done => Phase::Done,
            TaskStatus::Cancelled => Phase::Cancelled,
        }
    }
}

/// Snapshot of where the caller stands right now
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuidanceState {
    pub phase: Phase,
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub has_context: bool,
    pub can_complete: bool,
    pub time_since_update: Option<String>,
}

/// Ready-to-paste corrective or forward action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextAction {
    pub priority: HintPriority,
    pub action: String,
    pub tool: String,
    pub params: Value,
    pub reason: String,
}

/// The guidance object carried on every response, success or failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowGuidance {
    pub current_state: GuidanceState,
    pub rules: Vec<String>,
    pub next_actions: Vec<NextAction>,
    pub hints: Vec<String>,
    pub warnings: Vec<String>,
    pub examples: BTreeMap<String, String>,
}

/// Request-scoped inputs the rules read. Everything is borrowed; the
/// engine never loads data itself.
pub struct HintInputs<'a> {
    pub tool: &'a str,
    pub task: Option<&'a Task>,
    pub context: Option<&'a TaskContext>,
    pub children: &'a [Task],
    pub alignments: &'a [VisionAlignment],
    pub open_conflicts: &'a [AssignmentConflict],
    pub error: Option<&'a OrchestrationError>,
    pub now: DateTime<Utc>,
}

struct Draft {
    actions: Vec<(HintKind, NextAction)>,
    hints: Vec<String>,
    warnings: Vec<String>,
    rules: Vec<String>,
}

/// Deterministic rule engine producing [`WorkflowGuidance`].
#[derive(Debug, Clone)]
pub struct HintEngine {
    staleness_threshold: Duration,
    max_hints: usize,
}

impl HintEngine {
    pub fn new(staleness_threshold: Duration, max_hints: usize) -> Self {
        Self {
            staleness_threshold,
            max_hints,
        }
    }

    /// Build the guidance block for one reply
    pub fn guidance(&self, inputs: &HintInputs<'_>) -> WorkflowGuidance {
        let state = self.state(inputs);
        let mut draft = Draft {
            actions: Vec::new(),
            hints: Vec::new(),
            warnings: Vec::new(),
            rules: Vec::new(),
        };

        // Fixed rule order; priority sorting below is stable so insertion
        // order decides ties
        self.rule_corrective(inputs, &mut draft);
        self.rule_stale(inputs, &mut draft);
        self.rule_not_started(inputs, &mut draft);
        self.rule_blocked(inputs, &mut draft);
        self.rule_near_completion(inputs, &mut draft);
        self.rule_done_followup(inputs, &mut draft);
        self.rule_missing_context(inputs, &mut draft);
        self.rule_high_alignment(inputs, &mut draft);
        self.rule_open_conflict(inputs, &mut draft);
        self.rule_active_invariants(inputs, &mut draft);

        let mut next_actions: Vec<NextAction> =
            draft.actions.into_iter().map(|(_, a)| a).collect();
        next_actions.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut hints = draft.hints;
        hints.truncate(self.max_hints);

        WorkflowGuidance {
            current_state: state,
            rules: draft.rules,
            next_actions,
            hints,
            warnings: draft.warnings,
            examples: self.examples(inputs),
        }
    }

    /// Materialise the rule outputs as persistable hint records for the
    /// on-demand `get_workflow_hints` surface. Ids are assigned by the
    /// hint store.
    pub fn derive_hints(&self, inputs: &HintInputs<'_>) -> Vec<WorkflowHint> {
        let Some(task) = inputs.task else {
            return Vec::new();
        };
        let mut draft = Draft {
            actions: Vec::new(),
            hints: Vec::new(),
            warnings: Vec::new(),
            rules: Vec::new(),
        };
        self.rule_corrective(inputs, &mut draft);
        self.rule_stale(inputs, &mut draft);
        self.rule_not_started(inputs, &mut draft);
        self.rule_blocked(inputs, &mut draft);
        self.rule_near_completion(inputs, &mut draft);
        self.rule_done_followup(inputs, &mut draft);
        self.rule_missing_context(inputs, &mut draft);
        self.rule_high_alignment(inputs, &mut draft);
        self.rule_open_conflict(inputs, &mut draft);

        let mut out: Vec<WorkflowHint> = draft
            .actions
            .into_iter()
            .map(|(kind, action)| WorkflowHint {
                id: String::new(),
                task_id: task.id.clone(),
                kind,
                priority: action.priority,
                message: action.action,
                suggested_tool: Some(action.tool),
                suggested_params: action.params,
                rationale: Some(action.reason),
                confidence: match action.priority {
                    HintPriority::Critical => 0.95,
                    HintPriority::High => 0.85,
                    HintPriority::Medium => 0.7,
                    HintPriority::Low => 0.5,
                },
                expires_at: Some(inputs.now + self.staleness_threshold),
            })
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }

    fn state(&self, inputs: &HintInputs<'_>) -> GuidanceState {
        let task = inputs.task;
        let has_context = inputs.context.is_some();
        let can_complete = task
            .map(|t| {
                t.can_transition_to(TaskStatus::Done)
                    && inputs.children.iter().all(|c| c.status == TaskStatus::Done)
            })
            .unwrap_or(false);
        let time_since_update = task.map(|t| {
            let last = inputs
                .context
                .map(|c| c.last_updated)
                .unwrap_or(t.updated_at);
            humanize(inputs.now - last)
        });

        GuidanceState {
            phase: Phase::derive(task),
            status: task.map(|t| t.status),
            progress: task.map(|t| t.overall_progress),
            has_context,
            can_complete,
            time_since_update,
        }
    }

    /// Error-specific corrective action; always first so a failed call's
    /// top action is the fix
    fn rule_corrective(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(error) = inputs.error else {
            return;
        };
        let task_id = inputs
            .task
            .map(|t| t.id.as_str())
            .unwrap_or("<task id>");

        match error {
            OrchestrationError::MissingCompletionSummary(_) => {
                draft.actions.push((
                    HintKind::Completion,
                    NextAction {
                        priority: HintPriority::Critical,
                        action: "Retry completion with a summary of what was accomplished"
                            .to_string(),
                        tool: "manage_task".to_string(),
                        params: json!({
                            "action": "complete",
                            "task_id": task_id,
                            "completion_summary": "<one paragraph on what was accomplished>",
                        }),
                        reason: "Completion is gated on a non-empty completion_summary".to_string(),
                    },
                ));
            }
            OrchestrationError::IncompleteSubtasks { open_subtasks, .. } => {
                draft.warnings.push(format!(
                    "Open subtasks block completion: {}",
                    open_subtasks.join(", ")
                ));
                for subtask_id in open_subtasks {
                    draft.actions.push((
                        HintKind::Completion,
                        NextAction {
                            priority: HintPriority::Critical,
                            action: format!("Complete subtask {subtask_id} first"),
                            tool: "complete_subtask_with_update".to_string(),
                            params: json!({
                                "task_id": task_id,
                                "subtask_id": subtask_id,
                                "completion_summary": "<what this subtask delivered>",
                            }),
                            reason: "A parent cannot complete while subtasks remain open"
                                .to_string(),
                        },
                    ));
                }
            }
            OrchestrationError::ConcurrentModification(_) => {
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Re-read the task and retry the mutation".to_string(),
                        tool: "manage_task".to_string(),
                        params: json!({ "action": "get", "task_id": task_id }),
                        reason: "Another writer committed first; the mutation was not applied"
                            .to_string(),
                    },
                ));
            }
            OrchestrationError::Timeout(_) => {
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Retry the call".to_string(),
                        tool: inputs.tool.to_string(),
                        params: json!({ "task_id": task_id }),
                        reason: "The call hit its deadline; no changes were kept".to_string(),
                    },
                ));
            }
            OrchestrationError::AssignmentConflict { conflict_id, .. } => {
                draft.actions.push((
                    HintKind::Collaboration,
                    NextAction {
                        priority: HintPriority::Critical,
                        action: "Resolve the assignment conflict".to_string(),
                        tool: "resolve_conflict".to_string(),
                        params: json!({
                            "conflict_id": conflict_id,
                            "strategy": "merge",
                            "resolved_by": "<your agent id>",
                            "details": "<why this resolution>",
                        }),
                        reason: "Two primary-assignment writes collided on this task".to_string(),
                    },
                ));
            }
            OrchestrationError::InvalidHandoffState { handoff_id, state, .. } => {
                draft.hints.push(format!(
                    "Handoff {handoff_id} is '{state}'; only requested handoffs can be accepted or rejected, and only accepted ones completed"
                ));
            }
            OrchestrationError::AgentUnavailable(_) => {
                draft.actions.push((
                    HintKind::Collaboration,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Let the coordinator pick an available agent".to_string(),
                        tool: "assign_agent_to_task".to_string(),
                        params: json!({
                            "task_id": task_id,
                            "agent_id": "auto",
                            "role": "<required role>",
                        }),
                        reason: "The requested agent is offline or no agent qualified".to_string(),
                    },
                ));
            }
            OrchestrationError::InvalidParameters(fields) => {
                let placeholders: Value = fields
                    .iter()
                    .map(|f| (f.clone(), Value::String("<corrected value>".to_string())))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: format!("Retry with valid values for: {}", fields.join(", ")),
                        tool: inputs.tool.to_string(),
                        params: placeholders,
                        reason: "Parameter shape did not match the tool contract".to_string(),
                    },
                ));
            }
            OrchestrationError::Validation(msg) => {
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Correct the rejected value and retry".to_string(),
                        tool: inputs.tool.to_string(),
                        params: json!({ "task_id": task_id }),
                        reason: msg.clone(),
                    },
                ));
            }
            OrchestrationError::NotFound(what) => {
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "List tasks to find a valid id".to_string(),
                        tool: "manage_task".to_string(),
                        params: json!({ "action": "list" }),
                        reason: format!("{what} does not exist"),
                    },
                ));
            }
            OrchestrationError::UnknownTool(name) => {
                draft.hints.push(format!(
                    "'{name}' is not a tool; see the examples for the supported surface"
                ));
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Ask for hints on a task to see usable calls".to_string(),
                        tool: "get_workflow_hints".to_string(),
                        params: json!({ "task_id": "<task id>" }),
                        reason: "The tool name was not recognised".to_string(),
                    },
                ));
            }
            OrchestrationError::InvalidStateTransition { from, to } => {
                draft.hints.push(format!(
                    "Tasks cannot move from '{from}' straight to '{to}'; pass through an intermediate status"
                ));
                draft.actions.push((
                    HintKind::NextAction,
                    NextAction {
                        priority: HintPriority::High,
                        action: "Re-read the task to see its current status".to_string(),
                        tool: "manage_task".to_string(),
                        params: json!({ "action": "get", "task_id": task_id }),
                        reason: "The requested status is not reachable from the current one"
                            .to_string(),
                    },
                ));
            }
            OrchestrationError::VisionNodeMissing(_)
            | OrchestrationError::AlignmentUnavailable(_)
            | OrchestrationError::StorageUnavailable(_) => {}
        }
    }

    fn rule_stale(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.status != TaskStatus::InProgress {
            return;
        }
        let last = inputs
            .context
            .map(|c| c.last_updated)
            .unwrap_or(task.updated_at);
        let elapsed = inputs.now - last;
        if elapsed <= self.staleness_threshold {
            return;
        }

        draft.warnings.push(format!(
            "Context is stale: no update for {} (threshold {}m)",
            humanize(elapsed),
            self.staleness_threshold.num_minutes()
        ));
        draft.actions.push((
            HintKind::NextAction,
            NextAction {
                priority: HintPriority::Critical,
                action: "Record what you have been doing".to_string(),
                tool: "quick_task_update".to_string(),
                params: json!({
                    "task_id": task.id,
                    "what_i_did": "<one line on the work since the last update>",
                    "progress_percentage": task.overall_progress,
                }),
                reason: "In-progress tasks should leave a progress trail between conversations"
                    .to_string(),
            },
        ));
    }

    fn rule_not_started(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.status != TaskStatus::Todo {
            return;
        }
        draft.actions.push((
            HintKind::NextAction,
            NextAction {
                priority: HintPriority::High,
                action: "Start the task".to_string(),
                tool: "manage_task".to_string(),
                params: json!({
                    "action": "update",
                    "task_id": task.id,
                    "status": "in_progress",
                }),
                reason: "The task is still in todo".to_string(),
            },
        ));
    }

    fn rule_blocked(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.status != TaskStatus::Blocked {
            return;
        }
        draft.actions.push((
            HintKind::BlockerResolution,
            NextAction {
                priority: HintPriority::High,
                action: "Describe the blocker so it can be routed".to_string(),
                tool: "report_progress".to_string(),
                params: json!({
                    "task_id": task.id,
                    "progress_type": "general",
                    "description": "<what is blocking and who can unblock it>",
                    "percentage": task.overall_progress,
                    "metadata": { "blockers": ["<blocker>"] },
                }),
                reason: "Blocked tasks need a recorded blocker to be actionable".to_string(),
            },
        ));
    }

    fn rule_near_completion(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.is_terminal() || task.overall_progress < 80 {
            return;
        }
        let has_summary = inputs
            .context
            .map(|c| c.has_completion_summary())
            .unwrap_or(false);
        if has_summary {
            return;
        }
        draft.hints.push(format!(
            "Task {} is at {}%; prepare a completion summary and next recommendations",
            task.id, task.overall_progress
        ));
        draft.actions.push((
            HintKind::Completion,
            NextAction {
                priority: HintPriority::Medium,
                action: "Complete the task with a summary".to_string(),
                tool: "complete_task_with_update".to_string(),
                params: json!({
                    "task_id": task.id,
                    "completion_summary": "<one paragraph on what was accomplished>",
                    "next_recommendations": ["<follow-up work>"],
                }),
                reason: "Nearly done; completion needs a summary anyway".to_string(),
            },
        ));
    }

    fn rule_done_followup(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.status != TaskStatus::Done {
            return;
        }
        draft.actions.push((
            HintKind::NextAction,
            NextAction {
                priority: HintPriority::Low,
                action: "Pick up the next task on this branch".to_string(),
                tool: "manage_task".to_string(),
                params: json!({ "action": "next", "branch_id": task.branch_id }),
                reason: "This task is finished".to_string(),
            },
        ));
    }

    fn rule_missing_context(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(task) = inputs.task else { return };
        if task.is_terminal() || task.status == TaskStatus::Todo {
            return;
        }
        let has_notes = inputs
            .context
            .map(|c| !c.progress_notes.is_empty())
            .unwrap_or(false);
        if has_notes {
            return;
        }
        draft.actions.push((
            HintKind::NextAction,
            NextAction {
                priority: HintPriority::Medium,
                action: "Checkpoint your current state".to_string(),
                tool: "checkpoint_work".to_string(),
                params: json!({
                    "task_id": task.id,
                    "current_state": "<where the work stands>",
                    "next_steps": ["<next concrete step>"],
                }),
                reason: "No progress notes exist yet; the context is the only memory between calls"
                    .to_string(),
            },
        ));
    }

    fn rule_high_alignment(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        let Some(top) = inputs.alignments.first() else {
            return;
        };
        if top.score < 0.8 {
            return;
        }
        draft.hints.push(format!(
            "★ High strategic importance: objective {} (score {:.2})",
            top.objective_id, top.score
        ));
    }

    fn rule_open_conflict(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        for conflict in inputs.open_conflicts {
            draft.warnings.push(format!(
                "Unresolved assignment conflict {} between {} and {}",
                conflict.id, conflict.incumbent.agent_id, conflict.challenger.agent_id
            ));
            draft.actions.push((
                HintKind::Collaboration,
                NextAction {
                    priority: HintPriority::Critical,
                    action: format!("Resolve conflict {}", conflict.id),
                    tool: "resolve_conflict".to_string(),
                    params: json!({
                        "conflict_id": conflict.id,
                        "strategy": "merge",
                        "resolved_by": "<your agent id>",
                        "details": "<why this resolution>",
                    }),
                    reason: "Manual escalation was requested or the collision is unresolved"
                        .to_string(),
                },
            ));
        }
    }

    /// Human-readable statement of the invariants bearing on this state
    fn rule_active_invariants(&self, inputs: &HintInputs<'_>, draft: &mut Draft) {
        draft
            .rules
            .push("Completion requires a non-empty completion_summary".to_string());
        if let Some(task) = inputs.task {
            if !task.subtask_ids.is_empty() {
                draft
                    .rules
                    .push("Every subtask must be done before the parent can complete".to_string());
                draft.rules.push(
                    "Parent progress is the aggregate of its subtasks".to_string(),
                );
            }
            if task.status == TaskStatus::InProgress {
                draft.rules.push(format!(
                    "In-progress tasks count as stale after {}m without a context update",
                    self.staleness_threshold.num_minutes()
                ));
            }
        }
        draft
            .rules
            .push("Progress reports need a progress_type and description".to_string());
    }

    fn examples(&self, inputs: &HintInputs<'_>) -> BTreeMap<String, String> {
        let task_id = inputs
            .task
            .map(|t| t.id.as_str())
            .unwrap_or("<task id>");
        let mut examples = BTreeMap::new();
        examples.insert(
            "complete_task".to_string(),
            format!(
                "complete_task_with_update(task_id={task_id}, completion_summary=\"<what was done>\")"
            ),
        );
        examples.insert(
            "quick_update".to_string(),
            format!(
                "quick_task_update(task_id={task_id}, what_i_did=\"<one line>\", progress_percentage=50)"
            ),
        );
        examples.insert(
            "report_progress".to_string(),
            format!(
                "report_progress(task_id={task_id}, progress_type=implementation, description=\"<detail>\", percentage=40)"
            ),
        );
        examples.insert(
            "get_hints".to_string(),
            format!("get_workflow_hints(task_id={task_id})"),
        );
        examples
    }
}

/// Compact duration rendering: "45m", "2h15m"
fn humanize(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h{}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn engine() -> HintEngine {
        HintEngine::new(Duration::minutes(30), 6)
    }

    fn inputs<'a>(
        task: Option<&'a Task>,
        context: Option<&'a TaskContext>,
        error: Option<&'a OrchestrationError>,
        now: DateTime<Utc>,
    ) -> HintInputs<'a> {
        HintInputs {
            tool: "manage_task",
            task,
            context,
            children: &[],
            alignments: &[],
            open_conflicts: &[],
            error,
            now,
        }
    }

    #[test]
    fn test_guidance_is_deterministic() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        let ctx = TaskContext::new("task-1", now - Duration::minutes(45));

        let engine = engine();
        let a = engine.guidance(&inputs(Some(&task), Some(&ctx), None, now));
        let b = engine.guidance(&inputs(Some(&task), Some(&ctx), None, now));

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_stale_task_gets_quick_update_first() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        let ctx = TaskContext::new("task-1", now - Duration::minutes(45));

        let guidance = engine().guidance(&inputs(Some(&task), Some(&ctx), None, now));

        assert!(guidance.warnings.iter().any(|w| w.contains("stale")));
        assert_eq!(guidance.next_actions[0].tool, "quick_task_update");
        assert_eq!(guidance.next_actions[0].priority, HintPriority::Critical);
    }

    #[test]
    fn test_missing_summary_correction_outranks_staleness() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        let ctx = TaskContext::new("task-1", now - Duration::minutes(45));
        let error = OrchestrationError::MissingCompletionSummary("task-1".to_string());

        let guidance = engine().guidance(&inputs(Some(&task), Some(&ctx), Some(&error), now));

        // Both rules fire critical actions; the corrective one is first
        assert_eq!(guidance.next_actions[0].tool, "manage_task");
        assert!(guidance.next_actions[0]
            .params
            .get("completion_summary")
            .is_some());
    }

    #[test]
    fn test_todo_task_suggests_starting() {
        let now = Utc::now();
        let task = Task::seed("task-1", "Work", "Work item", "branch-1", now);

        let guidance = engine().guidance(&inputs(Some(&task), None, None, now));
        let start = guidance
            .next_actions
            .iter()
            .find(|a| a.params.get("status").is_some())
            .expect("start action");
        assert_eq!(start.tool, "manage_task");
        assert_eq!(start.params["status"], "in_progress");
    }

    #[test]
    fn test_phase_is_always_known() {
        let now = Utc::now();
        let guidance = engine().guidance(&inputs(None, None, None, now));
        assert!(Phase::ALL.contains(&guidance.current_state.phase));
        assert_eq!(guidance.current_state.phase, Phase::Unknown);

        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        task.overall_progress = 85;
        let guidance = engine().guidance(&inputs(Some(&task), None, None, now));
        assert_eq!(guidance.current_state.phase, Phase::Completion);
    }

    #[test]
    fn test_high_alignment_hint_is_starred() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        let alignments = vec![VisionAlignment {
            objective_id: "obj-1".to_string(),
            score: 0.85,
            confidence: 0.9,
            contribution: crate::models::ContributionKind::Direct,
        }];
        let ctx_record = TaskContext::new("task-1", now);

        let mut i = inputs(Some(&task), Some(&ctx_record), None, now);
        i.alignments = &alignments;
        let guidance = engine().guidance(&i);
        assert!(guidance.hints.iter().any(|h| h.starts_with('★')));
    }

    #[test]
    fn test_derived_hints_sorted_by_priority() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "Work", "Work item", "branch-1", now);
        task.status = TaskStatus::InProgress;
        // Stale (critical) and missing notes (medium) both apply
        let ctx = TaskContext::new("task-1", now - Duration::minutes(45));

        let hints = engine().derive_hints(&inputs(Some(&task), Some(&ctx), None, now));
        assert!(hints.len() >= 2);
        assert!(hints.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert!(hints.iter().all(|h| h.task_id == "task-1"));
    }
}
