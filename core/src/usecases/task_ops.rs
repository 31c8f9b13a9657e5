//! `manage_task` and `complete_task_with_update`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    config::EngineConfig,
    error::{OrchestrationError, Result},
    events::DomainEvent,
    models::{NewTask, TaskFilter, TaskPatch},
    protocol::{decode_params, CompleteTaskParams, ManageTaskParams, TaskAction},
};

use super::{
    apply_patch_flow, complete_task_flow, load_task, mutate_task, EngineDeps, EngineServices,
    UseCase,
};

/// Primary task CRUD, completion, and query surface
pub struct ManageTask {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl ManageTask {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }

    fn require_task_id(params: &ManageTaskParams) -> Result<&str> {
        params
            .task_id
            .as_deref()
            .ok_or_else(|| OrchestrationError::empty_field("task_id"))
    }

    async fn create(&self, params: ManageTaskParams, now: DateTime<Utc>) -> Result<Value> {
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
        if params
            .branch_id
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
        {
            missing.push("branch_id".to_string());
        }
        if !missing.is_empty() {
            return Err(OrchestrationError::InvalidParameters(missing));
        }

        let task = self
            .deps
            .tasks
            .create(NewTask {
                title: params.title.unwrap_or_default(),
                description: params.description.unwrap_or_default(),
                priority: params.priority.unwrap_or_default(),
                branch_id: params.branch_id.unwrap_or_default(),
                assignee: params.assignee,
                parent_id: None,
                labels: params.labels.unwrap_or_default(),
                milestones: params.milestones.unwrap_or_default(),
            })
            .await?;

        self.services
            .bus
            .dispatch_committed(
                vec![DomainEvent::TaskCreated {
                    task_id: task.id.clone(),
                    branch_id: task.branch_id.clone(),
                }],
                now,
            )
            .await;

        tracing::info!(task_id = %task.id, branch_id = %task.branch_id, "task created");
        Ok(json!({ "task": task }))
    }

    async fn get(&self, params: ManageTaskParams, now: DateTime<Utc>) -> Result<Value> {
        let task_id = Self::require_task_id(&params)?;
        let task = load_task(&self.deps, task_id).await?;
        let context = self.deps.contexts.get_by_task(task_id).await?;
        let subtasks = self.deps.tasks.find_children(task_id).await?;

        let include_vision = params
            .include_vision
            .unwrap_or(self.deps.config.include_vision_by_default);
        let vision_context = if include_vision {
            match self.services.enricher.enrich(&task, now).await {
                Ok(v) => Some(v),
                Err(OrchestrationError::AlignmentUnavailable(_)) => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(json!({
            "task": task,
            "context": context,
            "subtasks": subtasks,
            "vision_context": vision_context,
        }))
    }

    async fn update(&self, params: ManageTaskParams, now: DateTime<Utc>) -> Result<Value> {
        let task_id = Self::require_task_id(&params)?.to_string();
        let patch = TaskPatch {
            title: params.title,
            description: params.description,
            status: params.status,
            priority: params.priority,
            assignee: params.assignee.map(Some),
            labels: params.labels,
        };
        let (task, _) = apply_patch_flow(&self.deps, &self.services, &task_id, patch, now).await?;
        Ok(json!({ "task": task }))
    }

    async fn complete(&self, params: ManageTaskParams, now: DateTime<Utc>) -> Result<Value> {
        let task_id = Self::require_task_id(&params)?.to_string();
        let summary = self
            .services
            .enforcer
            .require_completion_summary(&task_id, params.completion_summary.as_deref())?;
        let (task, _) = complete_task_flow(
            &self.deps,
            &self.services,
            &task_id,
            &summary,
            None,
            Vec::new(),
            None,
            now,
        )
        .await?;
        Ok(json!({ "task": task }))
    }

    /// Highest-priority non-terminal task; priority desc, then least
    /// recently touched first
    async fn next(&self, params: ManageTaskParams) -> Result<Value> {
        let filter = TaskFilter::default();
        let mut tasks = match &params.branch_id {
            Some(branch) => self.deps.tasks.find_by_branch(branch, filter).await?,
            None => self.deps.tasks.list(filter).await?,
        };
        tasks.retain(|t| !t.is_terminal() && t.parent_id.is_none());
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.updated_at.cmp(&b.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(json!({ "task": tasks.first() }))
    }

    async fn list(&self, params: ManageTaskParams) -> Result<Value> {
        let filter = TaskFilter {
            branch_id: params.branch_id,
            status: params.status,
            assignee: params.assignee,
            priority: params.priority,
            limit: params.limit,
            offset: params.offset,
        };
        let tasks = self.deps.tasks.list(filter).await?;
        Ok(json!({ "count": tasks.len(), "tasks": tasks }))
    }

    async fn search(&self, params: ManageTaskParams) -> Result<Value> {
        let query = params
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| OrchestrationError::empty_field("query"))?
            .to_lowercase();
        let limit = params.limit.unwrap_or(20) as usize;

        let filter = TaskFilter {
            branch_id: params.branch_id,
            ..Default::default()
        };
        let mut tasks = self.deps.tasks.list(filter).await?;
        tasks.retain(|t| {
            t.title.to_lowercase().contains(&query) || t.description.to_lowercase().contains(&query)
        });
        tasks.truncate(limit);
        Ok(json!({ "count": tasks.len(), "tasks": tasks }))
    }

    /// Delete a task and cascade to its whole subtree; a deleted subtask's
    /// parent recomputes its aggregate
    async fn delete(&self, params: ManageTaskParams, now: DateTime<Utc>) -> Result<Value> {
        let task_id = Self::require_task_id(&params)?.to_string();
        let task = load_task(&self.deps, &task_id).await?;

        let mut cascaded = Vec::new();
        let mut frontier = vec![task_id.clone()];
        while let Some(current) = frontier.pop() {
            for child in self.deps.tasks.find_children(&current).await? {
                frontier.push(child.id.clone());
                cascaded.push(child.id);
            }
        }

        // Children go first so no subtask ever outlives its parent row
        for id in cascaded.iter().rev() {
            self.deps.contexts.delete_by_task(id).await?;
            self.deps.agents.remove_assignment(id).await?;
            self.deps.tasks.delete(id).await?;
        }
        self.deps.contexts.delete_by_task(&task_id).await?;
        self.deps.agents.remove_assignment(&task_id).await?;
        self.deps.tasks.delete(&task_id).await?;

        let mut events = vec![DomainEvent::TaskDeleted {
            task_id: task_id.clone(),
            cascaded: cascaded.clone(),
        }];
        if let Some(parent_id) = task.parent_id.clone() {
            let parent_deps = self.deps.clone();
            let parent_id_owned = parent_id.clone();
            let task_id_owned = task_id.clone();
            // Detach from the parent's child list before it recomputes
            mutate_task(&parent_deps, &parent_id_owned, move |mut parent| {
                parent.subtask_ids.retain(|id| id != &task_id_owned);
                parent.touch(now);
                Ok((parent, ()))
            })
            .await?;
            events.push(DomainEvent::SubtaskSetChanged {
                parent_id,
                subtask_id: task_id.clone(),
            });
        }

        self.services.bus.dispatch_committed(events, now).await;
        tracing::info!(task_id = %task_id, cascaded = cascaded.len(), "task deleted");
        Ok(json!({ "deleted": task_id, "cascaded": cascaded }))
    }
}

#[async_trait]
impl UseCase for ManageTask {
    fn name(&self) -> &'static str {
        "manage_task"
    }

    fn deadline(&self, config: &EngineConfig) -> std::time::Duration {
        // list/search/delete sweep whole branches
        config.batch_deadline()
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: ManageTaskParams = decode_params(raw)?;
        match params.action {
            TaskAction::Create => self.create(params, now).await,
            TaskAction::Get => self.get(params, now).await,
            TaskAction::Update => self.update(params, now).await,
            TaskAction::Complete => self.complete(params, now).await,
            TaskAction::Next => self.next(params).await,
            TaskAction::List => self.list(params).await,
            TaskAction::Search => self.search(params).await,
            TaskAction::Delete => self.delete(params, now).await,
        }
    }
}

/// Atomic context write + completion in one call
pub struct CompleteTaskWithUpdate {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl CompleteTaskWithUpdate {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for CompleteTaskWithUpdate {
    fn name(&self) -> &'static str {
        "complete_task_with_update"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: CompleteTaskParams = decode_params(raw)?;
        let summary = self
            .services
            .enforcer
            .require_completion_summary(&params.task_id, Some(&params.completion_summary))?;
        let (task, _) = complete_task_flow(
            &self.deps,
            &self.services,
            &params.task_id,
            &summary,
            params.testing_notes,
            params.next_recommendations,
            None,
            now,
        )
        .await?;
        let context = self.deps.contexts.get_by_task(&params.task_id).await?;
        Ok(json!({ "task": task, "context": context }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_reported_together() {
        let err = decode_params::<ManageTaskParams>(json!({}));
        assert!(err.is_err());
    }

    #[test]
    fn test_status_is_not_required_for_create() {
        let params: ManageTaskParams = decode_params(json!({
            "action": "create",
            "title": "T",
            "description": "D",
            "branch_id": "branch-1",
        }))
        .unwrap();
        assert_eq!(params.action, TaskAction::Create);
        assert!(params.status.is_none());
    }
}
