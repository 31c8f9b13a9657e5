//! `report_progress`, `quick_task_update`, and `checkpoint_work`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    aggregation::ProgressAggregator,
    error::Result,
    events::DomainEvent,
    models::{ProgressNote, ProgressSnapshot, ProgressType, Task},
    protocol::{
        decode_params, CheckpointWorkParams, QuickTaskUpdateParams, ReportProgressParams,
    },
};

use super::{load_or_new_context, load_task, mutate_task, EngineDeps, EngineServices, UseCase};

/// Shared recording transaction: validate the report, append the snapshot,
/// refresh overall progress and milestones, mirror a context note, and
/// propagate to the parent when the task is a subtask.
pub(crate) async fn report_progress_flow(
    deps: &EngineDeps,
    services: &EngineServices,
    params: ReportProgressParams,
    now: DateTime<Utc>,
) -> Result<(Task, String)> {
    let ReportProgressParams {
        task_id,
        progress_type,
        description,
        percentage,
        metadata,
        agent_id,
        weights,
    } = params;
    let metadata = metadata.unwrap_or_default();

    let snapshot_description = description.clone();
    let snapshot_agent = agent_id.clone();
    let snapshot_metadata = metadata.clone();
    let snapshot_weights = weights.clone();
    let (saved, (snapshot_id, mut events)) = mutate_task(deps, &task_id, move |mut task| {
        if task.is_terminal() {
            return Err(crate::error::OrchestrationError::Validation(format!(
                "task {} is {}; progress can no longer be reported",
                task.id, task.status
            )));
        }
        let snapshot = ProgressSnapshot {
            id: task.timeline.next_snapshot_id(&task.id),
            task_id: task.id.clone(),
            progress_type,
            percentage,
            description: snapshot_description.clone(),
            metadata: snapshot_metadata.clone(),
            timestamp: now,
            agent_id: snapshot_agent.clone(),
        };
        services.enforcer.check_progress_report(&snapshot)?;
        services.enforcer.check_monotonic(&task.timeline, &snapshot)?;

        let snapshot_id = snapshot.id.clone();
        let mut events = vec![DomainEvent::ProgressReported {
            task_id: task.id.clone(),
            progress_type: snapshot.progress_type,
            percentage: snapshot.percentage,
        }];
        events.extend(ProgressAggregator::record(
            &mut task,
            snapshot,
            snapshot_weights.as_ref(),
            now,
        ));
        task.touch(now);
        Ok((task, (snapshot_id, events)))
    })
    .await?;

    let mut context = load_or_new_context(deps, &task_id, now).await?;
    context.push_note(ProgressNote {
        timestamp: now,
        agent_id,
        text: description.clone(),
        progress_type,
        percentage,
    });
    deps.contexts.save(context).await?;
    events.push(DomainEvent::ContextUpdated {
        task_id: saved.id.clone(),
    });

    if let Some(parent_id) = saved.parent_id.clone() {
        events.push(DomainEvent::SubtaskProgressAggregated {
            parent_id,
            subtask_id: saved.id.clone(),
            subtask_progress: saved.overall_progress,
            note: ProgressAggregator::propagation_note(
                &saved.id,
                saved.overall_progress,
                &description,
            ),
        });
    }

    services.bus.dispatch_committed(events, now).await;
    Ok((saved, snapshot_id))
}

/// Appends a typed progress snapshot to a task's timeline
pub struct ReportProgress {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl ReportProgress {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for ReportProgress {
    fn name(&self) -> &'static str {
        "report_progress"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: ReportProgressParams = decode_params(raw)?;
        let (task, snapshot_id) =
            report_progress_flow(&self.deps, &self.services, params, now).await?;
        Ok(json!({ "task": task, "snapshot_id": snapshot_id }))
    }
}

/// Shorthand for a general progress report plus context note
pub struct QuickTaskUpdate {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl QuickTaskUpdate {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for QuickTaskUpdate {
    fn name(&self) -> &'static str {
        "quick_task_update"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: QuickTaskUpdateParams = decode_params(raw)?;
        let report = ReportProgressParams {
            task_id: params.task_id,
            progress_type: ProgressType::General,
            description: params.what_i_did,
            percentage: Some(params.progress_percentage),
            metadata: None,
            agent_id: params.agent_id,
            weights: None,
        };
        let (task, snapshot_id) =
            report_progress_flow(&self.deps, &self.services, report, now).await?;
        Ok(json!({ "task": task, "snapshot_id": snapshot_id }))
    }
}

/// Persists a state-of-the-work snapshot and the next steps list
pub struct CheckpointWork {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl CheckpointWork {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for CheckpointWork {
    fn name(&self) -> &'static str {
        "checkpoint_work"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: CheckpointWorkParams = decode_params(raw)?;
        if params.current_state.trim().is_empty() {
            return Err(crate::error::OrchestrationError::empty_field("current_state"));
        }
        let task = load_task(&self.deps, &params.task_id).await?;

        let mut context = load_or_new_context(&self.deps, &params.task_id, now).await?;
        context.push_note(ProgressNote {
            timestamp: now,
            agent_id: params.agent_id,
            text: params.current_state,
            progress_type: ProgressType::General,
            percentage: Some(task.overall_progress),
        });
        if !params.next_steps.is_empty() {
            context.next_recommendations = params.next_steps;
        }
        let context = self.deps.contexts.save(context).await?;

        self.services
            .bus
            .dispatch_committed(
                vec![DomainEvent::ContextUpdated {
                    task_id: task.id.clone(),
                }],
                now,
            )
            .await;

        Ok(json!({ "context": context }))
    }
}
