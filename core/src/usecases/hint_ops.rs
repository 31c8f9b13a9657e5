//! `get_workflow_hints` and `provide_hint_feedback`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    error::Result,
    guidance::HintInputs,
    models::HintFeedback,
    protocol::{decode_params, GetWorkflowHintsParams, ProvideHintFeedbackParams},
};

use super::{load_task, EngineDeps, EngineServices, UseCase};

/// On-demand hints for a task, persisted for effectiveness analytics
pub struct GetWorkflowHints {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl GetWorkflowHints {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for GetWorkflowHints {
    fn name(&self) -> &'static str {
        "get_workflow_hints"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: GetWorkflowHintsParams = decode_params(raw)?;
        let task = load_task(&self.deps, &params.task_id).await?;
        let context = self.deps.contexts.get_by_task(&params.task_id).await?;
        let children = self.deps.tasks.find_children(&params.task_id).await?;
        let conflicts = self.deps.agents.open_conflicts_for(&params.task_id).await?;
        // Materialised alignments are good enough for hinting; a cold task
        // simply hints without the strategic angle
        let alignments = self
            .deps
            .vision
            .get_alignment(&params.task_id)
            .await?
            .unwrap_or_default();

        let inputs = HintInputs {
            tool: self.name(),
            task: Some(&task),
            context: context.as_ref(),
            children: &children,
            alignments: &alignments,
            open_conflicts: &conflicts,
            error: None,
            now,
        };
        let mut derived = self.services.hint_engine.derive_hints(&inputs);

        if let Some(kinds) = &params.hint_types {
            derived.retain(|h| kinds.contains(&h.kind));
        }
        let cap = params
            .max_hints
            .unwrap_or(self.deps.config.max_hints_per_response);
        derived.truncate(cap);

        let mut persisted = Vec::with_capacity(derived.len());
        for hint in derived {
            persisted.push(self.deps.hints.save(hint).await?);
        }

        Ok(json!({ "count": persisted.len(), "hints": persisted }))
    }
}

/// Records whether a previously returned hint helped
pub struct ProvideHintFeedback {
    deps: Arc<EngineDeps>,
}

impl ProvideHintFeedback {
    pub fn new(deps: Arc<EngineDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl UseCase for ProvideHintFeedback {
    fn name(&self) -> &'static str {
        "provide_hint_feedback"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: ProvideHintFeedbackParams = decode_params(raw)?;
        self.deps
            .hints
            .mark_feedback(HintFeedback {
                hint_id: params.hint_id.clone(),
                task_id: params.task_id,
                was_helpful: params.was_helpful,
                agent_id: params.agent_id,
                comment: params.comment,
                recorded_at: now,
            })
            .await?;
        Ok(json!({ "recorded": true, "hint_id": params.hint_id }))
    }
}
