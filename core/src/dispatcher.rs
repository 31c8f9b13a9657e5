//! Tool dispatcher: the single entry point of the engine.
//!
//! Routes a `(tool_name, parameters)` pair to its use-case, enforces the
//! per-call deadline, and wraps every outcome (success, typed failure,
//! unknown tool, timeout) in the uniform envelope with workflow guidance
//! attached. No error escapes this boundary unwrapped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    error::{OrchestrationError, Result},
    guidance::HintInputs,
    models::{AssignmentConflict, Task, TaskContext, VisionAlignment},
    protocol::ToolResponse,
    usecases::{
        agent_ops::{
            AcceptHandoff, AssignAgentToTask, BroadcastStatus, CompleteHandoff, GetAgentWorkload,
            RejectHandoff, RequestWorkHandoff, ResolveConflict,
        },
        hint_ops::{GetWorkflowHints, ProvideHintFeedback},
        progress_ops::{CheckpointWork, QuickTaskUpdate, ReportProgress},
        subtask_ops::{CompleteSubtaskWithUpdate, ManageSubtask},
        task_ops::{CompleteTaskWithUpdate, ManageTask},
        vision_ops::GetVisionAlignment,
        EngineDeps, EngineServices, UseCase,
    },
};

/// State loaded once per reply for the hint engine
#[derive(Default)]
struct GuidanceData {
    task: Option<Task>,
    context: Option<TaskContext>,
    children: Vec<Task>,
    alignments: Vec<VisionAlignment>,
    open_conflicts: Vec<AssignmentConflict>,
}

/// Stateless per-request engine front door
pub struct ToolDispatcher {
    routes: HashMap<&'static str, Arc<dyn UseCase>>,
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl ToolDispatcher {
    /// Wire every use-case against the shared dependencies and services
    pub fn new(deps: EngineDeps) -> Self {
        let deps = Arc::new(deps);
        let services = Arc::new(EngineServices::build(&deps));

        let use_cases: Vec<Arc<dyn UseCase>> = vec![
            Arc::new(ManageTask::new(deps.clone(), services.clone())),
            Arc::new(CompleteTaskWithUpdate::new(deps.clone(), services.clone())),
            Arc::new(ManageSubtask::new(deps.clone(), services.clone())),
            Arc::new(CompleteSubtaskWithUpdate::new(deps.clone(), services.clone())),
            Arc::new(ReportProgress::new(deps.clone(), services.clone())),
            Arc::new(QuickTaskUpdate::new(deps.clone(), services.clone())),
            Arc::new(CheckpointWork::new(deps.clone(), services.clone())),
            Arc::new(GetWorkflowHints::new(deps.clone(), services.clone())),
            Arc::new(ProvideHintFeedback::new(deps.clone())),
            Arc::new(AssignAgentToTask::new(deps.clone(), services.clone())),
            Arc::new(RequestWorkHandoff::new(deps.clone(), services.clone())),
            Arc::new(AcceptHandoff::new(deps.clone(), services.clone())),
            Arc::new(RejectHandoff::new(deps.clone(), services.clone())),
            Arc::new(CompleteHandoff::new(deps.clone(), services.clone())),
            Arc::new(GetAgentWorkload::new(deps.clone())),
            Arc::new(ResolveConflict::new(deps.clone(), services.clone())),
            Arc::new(BroadcastStatus::new(deps.clone(), services.clone())),
            Arc::new(GetVisionAlignment::new(deps.clone(), services.clone())),
        ];
        let routes = use_cases
            .into_iter()
            .map(|uc| (uc.name(), uc))
            .collect();

        Self {
            routes,
            deps,
            services,
        }
    }

    /// Routed tool names, sorted for stable listings
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.routes.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Execute one tool invocation and always return a full envelope
    pub async fn dispatch(&self, tool: &str, params: Value) -> ToolResponse {
        let now = Utc::now();
        let started = std::time::Instant::now();

        let outcome = match self.routes.get(tool) {
            Some(use_case) => {
                let deadline = use_case.deadline(&self.deps.config);
                match tokio::time::timeout(deadline, use_case.execute(params.clone(), now)).await {
                    Ok(result) => result,
                    Err(_) => Err(OrchestrationError::Timeout(tool.to_string())),
                }
            }
            None => Err(OrchestrationError::UnknownTool(tool.to_string())),
        };

        let response = self.respond(tool, &params, outcome, now).await;
        let elapsed = started.elapsed();
        tracing::debug!(
            tool,
            success = response.success,
            duration_ms = elapsed.as_millis() as u64,
            "tool invocation finished"
        );
        if elapsed.as_millis() as u64 > self.deps.config.overhead_budget_ms {
            tracing::warn!(
                tool,
                duration_ms = elapsed.as_millis() as u64,
                budget_ms = self.deps.config.overhead_budget_ms,
                "tool invocation exceeded the overhead budget"
            );
        }
        response
    }

    async fn respond(
        &self,
        tool: &str,
        params: &Value,
        outcome: Result<Value>,
        now: DateTime<Utc>,
    ) -> ToolResponse {
        let data = self.guidance_data(params).await;
        let inputs = HintInputs {
            tool,
            task: data.task.as_ref(),
            context: data.context.as_ref(),
            children: &data.children,
            alignments: &data.alignments,
            open_conflicts: &data.open_conflicts,
            error: outcome.as_ref().err(),
            now,
        };
        let guidance = self.services.hint_engine.guidance(&inputs);

        match outcome {
            Ok(payload) => ToolResponse::ok(payload, guidance),
            Err(error) => {
                tracing::warn!(tool, code = ?error.code(), %error, "tool invocation failed");
                ToolResponse::failed(&error, guidance)
            }
        }
    }

    /// Best-effort state load for guidance; a broken store degrades hints,
    /// it never breaks the reply
    async fn guidance_data(&self, params: &Value) -> GuidanceData {
        let Some(task_id) = params.get("task_id").and_then(Value::as_str) else {
            return GuidanceData::default();
        };
        let mut data = GuidanceData {
            task: self.deps.tasks.get(task_id).await.ok().flatten(),
            ..Default::default()
        };
        if data.task.is_none() {
            return data;
        }
        data.context = self.deps.contexts.get_by_task(task_id).await.ok().flatten();
        data.children = self
            .deps
            .tasks
            .find_children(task_id)
            .await
            .unwrap_or_default();
        data.alignments = self
            .deps
            .vision
            .get_alignment(task_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        data.open_conflicts = self
            .deps
            .agents
            .open_conflicts_for(task_id)
            .await
            .unwrap_or_default();
        data
    }
}
