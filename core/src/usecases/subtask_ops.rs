//! `manage_subtask` and `complete_subtask_with_update`. Subtasks are full
//! tasks with a parent link; every mutation here keeps the parent's
//! aggregate and context in step through the event bus.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    error::{OrchestrationError, Result},
    events::DomainEvent,
    models::{NewTask, Task, TaskPatch},
    protocol::{decode_params, CompleteSubtaskParams, ManageSubtaskParams, SubtaskAction},
};

use super::{
    apply_patch_flow, complete_task_flow, load_task, mutate_task, EngineDeps, EngineServices,
    UseCase,
};

/// Subtask CRUD under a parent task
pub struct ManageSubtask {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl ManageSubtask {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }

    fn require_subtask_id(params: &ManageSubtaskParams) -> Result<&str> {
        params
            .subtask_id
            .as_deref()
            .ok_or_else(|| OrchestrationError::empty_field("subtask_id"))
    }

    /// A subtask call must name a child of the given parent
    async fn load_linked_subtask(&self, parent_id: &str, subtask_id: &str) -> Result<Task> {
        let subtask = load_task(&self.deps, subtask_id).await?;
        if subtask.parent_id.as_deref() != Some(parent_id) {
            return Err(OrchestrationError::Validation(format!(
                "{subtask_id} is not a subtask of {parent_id}"
            )));
        }
        Ok(subtask)
    }

    async fn create(&self, params: ManageSubtaskParams, now: DateTime<Utc>) -> Result<Value> {
        let mut missing = Vec::new();
        if params.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
            missing.push("title".to_string());
        }
        if params
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
        {
            missing.push("description".to_string());
        }
        if !missing.is_empty() {
            return Err(OrchestrationError::InvalidParameters(missing));
        }

        let parent = load_task(&self.deps, &params.task_id).await?;
        // A done parent may still grow subtasks (its aggregate drops); a
        // cancelled one may not
        if parent.status == crate::models::TaskStatus::Cancelled {
            return Err(OrchestrationError::Validation(format!(
                "cannot add subtasks to cancelled task {}",
                parent.id
            )));
        }

        let subtask = self
            .deps
            .tasks
            .create(NewTask {
                title: params.title.unwrap_or_default(),
                description: params.description.unwrap_or_default(),
                priority: params.priority.unwrap_or(parent.priority),
                branch_id: parent.branch_id.clone(),
                assignee: params.assignee,
                parent_id: Some(parent.id.clone()),
                labels: Vec::new(),
                milestones: Vec::new(),
            })
            .await?;

        let subtask_id = subtask.id.clone();
        mutate_task(&self.deps, &parent.id, move |mut parent| {
            if !parent.subtask_ids.contains(&subtask_id) {
                parent.subtask_ids.push(subtask_id.clone());
            }
            parent.touch(now);
            Ok((parent, ()))
        })
        .await?;

        // Adding a child after the parent hit 100% legitimately drops the
        // parent's aggregate; milestones stay fired until a re-crossing
        self.services
            .bus
            .dispatch_committed(
                vec![
                    DomainEvent::TaskCreated {
                        task_id: subtask.id.clone(),
                        branch_id: subtask.branch_id.clone(),
                    },
                    DomainEvent::SubtaskSetChanged {
                        parent_id: parent.id.clone(),
                        subtask_id: subtask.id.clone(),
                    },
                ],
                now,
            )
            .await;

        let parent = load_task(&self.deps, &parent.id).await?;
        Ok(json!({ "subtask": subtask, "parent": parent }))
    }

    async fn update(&self, params: ManageSubtaskParams, now: DateTime<Utc>) -> Result<Value> {
        let subtask_id = Self::require_subtask_id(&params)?.to_string();
        self.load_linked_subtask(&params.task_id, &subtask_id).await?;

        let patch = TaskPatch {
            title: params.title,
            description: params.description,
            status: params.status,
            priority: params.priority,
            assignee: params.assignee.map(Some),
            labels: None,
        };
        let (subtask, _) =
            apply_patch_flow(&self.deps, &self.services, &subtask_id, patch, now).await?;
        let parent = load_task(&self.deps, &params.task_id).await?;
        Ok(json!({ "subtask": subtask, "parent": parent }))
    }

    async fn complete(&self, params: ManageSubtaskParams, now: DateTime<Utc>) -> Result<Value> {
        let subtask_id = Self::require_subtask_id(&params)?.to_string();
        self.load_linked_subtask(&params.task_id, &subtask_id).await?;
        let summary = self
            .services
            .enforcer
            .require_completion_summary(&subtask_id, params.completion_summary.as_deref())?;

        let (subtask, _) = complete_task_flow(
            &self.deps,
            &self.services,
            &subtask_id,
            &summary,
            None,
            Vec::new(),
            None,
            now,
        )
        .await?;
        let parent = load_task(&self.deps, &params.task_id).await?;
        Ok(json!({ "subtask": subtask, "parent": parent }))
    }

    async fn delete(&self, params: ManageSubtaskParams, now: DateTime<Utc>) -> Result<Value> {
        let subtask_id = Self::require_subtask_id(&params)?.to_string();
        self.load_linked_subtask(&params.task_id, &subtask_id).await?;

        self.deps.contexts.delete_by_task(&subtask_id).await?;
        self.deps.agents.remove_assignment(&subtask_id).await?;
        self.deps.tasks.delete(&subtask_id).await?;

        let removed = subtask_id.clone();
        mutate_task(&self.deps, &params.task_id, move |mut parent| {
            parent.subtask_ids.retain(|id| id != &removed);
            parent.touch(now);
            Ok((parent, ()))
        })
        .await?;

        self.services
            .bus
            .dispatch_committed(
                vec![
                    DomainEvent::TaskDeleted {
                        task_id: subtask_id.clone(),
                        cascaded: Vec::new(),
                    },
                    DomainEvent::SubtaskSetChanged {
                        parent_id: params.task_id.clone(),
                        subtask_id: subtask_id.clone(),
                    },
                ],
                now,
            )
            .await;

        let parent = load_task(&self.deps, &params.task_id).await?;
        Ok(json!({ "deleted": subtask_id, "parent": parent }))
    }

    async fn list(&self, params: ManageSubtaskParams) -> Result<Value> {
        load_task(&self.deps, &params.task_id).await?;
        let subtasks = self.deps.tasks.find_children(&params.task_id).await?;
        Ok(json!({ "count": subtasks.len(), "subtasks": subtasks }))
    }
}

#[async_trait]
impl UseCase for ManageSubtask {
    fn name(&self) -> &'static str {
        "manage_subtask"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: ManageSubtaskParams = decode_params(raw)?;
        match params.action {
            SubtaskAction::Create => self.create(params, now).await,
            SubtaskAction::Update => self.update(params, now).await,
            SubtaskAction::Complete => self.complete(params, now).await,
            SubtaskAction::Delete => self.delete(params, now).await,
            SubtaskAction::List => self.list(params).await,
        }
    }
}

/// Subtask completion with atomic context write and parent propagation
pub struct CompleteSubtaskWithUpdate {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl CompleteSubtaskWithUpdate {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for CompleteSubtaskWithUpdate {
    fn name(&self) -> &'static str {
        "complete_subtask_with_update"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: CompleteSubtaskParams = decode_params(raw)?;
        let subtask = load_task(&self.deps, &params.subtask_id).await?;
        if subtask.parent_id.as_deref() != Some(params.task_id.as_str()) {
            return Err(OrchestrationError::Validation(format!(
                "{} is not a subtask of {}",
                params.subtask_id, params.task_id
            )));
        }
        let summary = self
            .services
            .enforcer
            .require_completion_summary(&params.subtask_id, Some(&params.completion_summary))?;

        let (subtask, _) = complete_task_flow(
            &self.deps,
            &self.services,
            &params.subtask_id,
            &summary,
            None,
            Vec::new(),
            None,
            now,
        )
        .await?;

        // Propagation ran on the bus inside the flow; the parent the caller
        // sees already carries the recomputed aggregate
        let parent = load_task(&self.deps, &params.task_id).await?;
        let parent_context = self.deps.contexts.get_by_task(&params.task_id).await?;
        Ok(json!({
            "subtask": subtask,
            "parent": parent,
            "parent_context": parent_context,
        }))
    }
}
