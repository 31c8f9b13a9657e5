//! One use-case per tool. Every use-case runs the same shape of logical
//! transaction: load aggregates, apply the authoritative rules, mutate in
//! memory, persist with optimistic version checks, then dispatch domain
//! events synchronously so their effects are visible in the same reply.
//!
//! The versioned write of the primary aggregate is the commit point. All
//! rule checks run before it, so a rejected call commits nothing; events
//! go out after it through [`EventBus::dispatch_committed`], so a failure
//! in a downstream handler can degrade derived state (logged, re-converges
//! on the next mutation) but can never turn an already-committed mutation
//! into a failed reply.

pub mod agent_ops;
pub mod hint_ops;
pub mod progress_ops;
pub mod subtask_ops;
pub mod task_ops;
pub mod vision_ops;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    aggregation::{ProgressAggregator, ProgressPropagationHandler},
    alignment::{AlignmentInvalidationHandler, VisionEnricher},
    config::EngineConfig,
    coordination::AgentCoordinator,
    enforcement::ContextEnforcer,
    error::{OrchestrationError, Result},
    events::{DomainEvent, EventBus},
    guidance::HintEngine,
    models::{ProgressNote, ProgressType, Task, TaskContext, TaskStatus},
    repository::{
        AgentRepository, ContextRepository, HintRepository, TaskRepository, VisionRepository,
    },
};

/// Repository ports and configuration injected into every use-case
pub struct EngineDeps {
    pub tasks: Arc<dyn TaskRepository>,
    pub contexts: Arc<dyn ContextRepository>,
    pub vision: Arc<dyn VisionRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub hints: Arc<dyn HintRepository>,
    pub config: EngineConfig,
}

/// Domain services built once at engine construction and shared by the
/// use-cases. No process-wide singletons; everything is owned here.
pub struct EngineServices {
    pub enforcer: ContextEnforcer,
    pub enricher: Arc<VisionEnricher>,
    pub coordinator: AgentCoordinator,
    pub bus: Arc<EventBus>,
    pub hint_engine: HintEngine,
}

impl EngineServices {
    pub fn build(deps: &EngineDeps) -> Self {
        let config = &deps.config;
        let enricher = Arc::new(VisionEnricher::new(
            deps.vision.clone(),
            config.alignment_cache_ttl(),
            config.max_alignments,
        ));
        let bus = Arc::new(
            EventBus::new(config.event_depth_limit)
                .with_handler(Arc::new(ProgressPropagationHandler::new(
                    deps.tasks.clone(),
                    deps.contexts.clone(),
                    config.retry_attempts,
                )))
                .with_handler(Arc::new(AlignmentInvalidationHandler::new(
                    enricher.clone(),
                ))),
        );
        Self {
            enforcer: ContextEnforcer::new(config.staleness_threshold()),
            enricher,
            coordinator: AgentCoordinator::new(deps.agents.clone()),
            bus,
            hint_engine: HintEngine::new(
                config.staleness_threshold(),
                config.max_hints_per_response,
            ),
        }
    }
}

/// A single tool-backed business operation
#[async_trait]
pub trait UseCase: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-call deadline; batch-flavoured tools override this
    fn deadline(&self, config: &EngineConfig) -> std::time::Duration {
        config.tool_deadline()
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value>;
}

/// Load a task or fail with `NOT_FOUND`
pub(crate) async fn load_task(deps: &EngineDeps, task_id: &str) -> Result<Task> {
    deps.tasks
        .get(task_id)
        .await?
        .ok_or_else(|| OrchestrationError::task_not_found(task_id))
}

/// Optimistic-lock mutation loop: re-read, apply `op`, persist against the
/// read version; retry with backoff on a lost race, then surface
/// `CONCURRENT_MODIFICATION`.
pub(crate) async fn mutate_task<T, F>(
    deps: &EngineDeps,
    task_id: &str,
    mut op: F,
) -> Result<(Task, T)>
where
    F: FnMut(Task) -> Result<(Task, T)> + Send,
    T: Send,
{
    let mut attempt: u8 = 0;
    loop {
        let task = load_task(deps, task_id).await?;
        let expected = task.version;
        let (updated, out) = op(task)?;
        match deps.tasks.update_with_version(updated, expected).await {
            Ok(saved) => return Ok((saved, out)),
            Err(e) if e.is_concurrent_modification() && attempt < deps.config.retry_attempts => {
                attempt += 1;
                tracing::debug!(task_id, attempt, "optimistic lock lost, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(10 * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Load a task's context or start a fresh one
pub(crate) async fn load_or_new_context(
    deps: &EngineDeps,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<TaskContext> {
    Ok(deps
        .contexts
        .get_by_task(task_id)
        .await?
        .unwrap_or_else(|| TaskContext::new(task_id, now)))
}

/// Shared completion transaction: gate on summary and subtasks, write the
/// context, mark the task done at 100%, and emit the event set including
/// upward propagation when the task is a subtask.
///
/// The done-flip is the write that carries the completion invariants, so
/// it is the commit point and goes last: the context summary lands first
/// (a summary on a not-yet-done task breaks nothing if the final write
/// loses its race), and the gates are pre-flighted so a blocked completion
/// writes nothing at all. The mutate closure re-checks the gates anyway;
/// they stay authoritative under retry.
pub(crate) async fn complete_task_flow(
    deps: &EngineDeps,
    services: &EngineServices,
    task_id: &str,
    summary: &str,
    testing_notes: Option<String>,
    next_recommendations: Vec<String>,
    agent_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<(Task, Vec<DomainEvent>)> {
    let children = deps.tasks.find_children(task_id).await?;

    let current = load_task(deps, task_id).await?;
    if !current.can_transition_to(TaskStatus::Done) {
        return Err(OrchestrationError::InvalidStateTransition {
            from: current.status,
            to: TaskStatus::Done,
        });
    }
    services.enforcer.require_subtasks_done(&current, &children)?;

    let mut context = load_or_new_context(deps, task_id, now).await?;
    context.completion_summary = Some(summary.to_string());
    if testing_notes.is_some() {
        context.testing_notes = testing_notes;
    }
    if !next_recommendations.is_empty() {
        context.next_recommendations = next_recommendations;
    }
    context.push_note(ProgressNote {
        timestamp: now,
        agent_id,
        text: format!("Completed: {summary}"),
        progress_type: ProgressType::General,
        percentage: Some(100),
    });
    deps.contexts.save(context).await?;

    let (saved, mut events) = mutate_task(deps, task_id, |mut task| {
        if !task.can_transition_to(TaskStatus::Done) {
            return Err(OrchestrationError::InvalidStateTransition {
                from: task.status,
                to: TaskStatus::Done,
            });
        }
        services.enforcer.require_subtasks_done(&task, &children)?;

        let from = task.status;
        let previous = task.overall_progress;
        task.status = TaskStatus::Done;
        task.overall_progress = 100;

        let mut events = vec![
            DomainEvent::TaskStatusChanged {
                task_id: task.id.clone(),
                from,
                to: TaskStatus::Done,
            },
            DomainEvent::TaskCompleted {
                task_id: task.id.clone(),
            },
        ];
        events.extend(ProgressAggregator::update_milestones(&mut task, previous, now));
        task.touch(now);
        Ok((task, events))
    })
    .await?;

    events.push(DomainEvent::ContextUpdated {
        task_id: saved.id.clone(),
    });
    if let Some(parent_id) = saved.parent_id.clone() {
        events.push(DomainEvent::SubtaskProgressAggregated {
            parent_id,
            subtask_id: saved.id.clone(),
            subtask_progress: 100,
            note: ProgressAggregator::propagation_note(&saved.id, 100, summary),
        });
    }

    let processed = services.bus.dispatch_committed(events, now).await;
    Ok((saved, processed))
}

/// Shared partial-update transaction used by `manage_task` and
/// `manage_subtask`. A status change to `done` through this path requires
/// the context to already carry a completion summary.
pub(crate) async fn apply_patch_flow(
    deps: &EngineDeps,
    services: &EngineServices,
    task_id: &str,
    patch: crate::models::TaskPatch,
    now: DateTime<Utc>,
) -> Result<(Task, Vec<DomainEvent>)> {
    let children = deps.tasks.find_children(task_id).await?;
    let context = deps.contexts.get_by_task(task_id).await?;

    let (saved, mut events) = mutate_task(deps, task_id, |mut task| {
        let mut events = Vec::new();

        if let Some(status) = patch.status {
            if status != task.status {
                if !task.can_transition_to(status) {
                    return Err(OrchestrationError::InvalidStateTransition {
                        from: task.status,
                        to: status,
                    });
                }
                if status == TaskStatus::Done {
                    let has_summary = context
                        .as_ref()
                        .map(|c| c.has_completion_summary())
                        .unwrap_or(false);
                    if !has_summary {
                        return Err(OrchestrationError::MissingCompletionSummary(
                            task.id.clone(),
                        ));
                    }
                    services.enforcer.require_subtasks_done(&task, &children)?;
                }
                let from = task.status;
                task.status = status;
                events.push(DomainEvent::TaskStatusChanged {
                    task_id: task.id.clone(),
                    from,
                    to: status,
                });
                if status == TaskStatus::Done {
                    let previous = task.overall_progress;
                    task.overall_progress = 100;
                    events.push(DomainEvent::TaskCompleted {
                        task_id: task.id.clone(),
                    });
                    events.extend(ProgressAggregator::update_milestones(
                        &mut task, previous, now,
                    ));
                }
            }
        }

        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(description) = &patch.description {
            task.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assignee) = &patch.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(labels) = &patch.labels {
            task.labels = labels.clone();
        }
        task.touch(now);
        Ok((task, events))
    })
    .await?;

    let completed_now = events
        .iter()
        .any(|e| matches!(e, DomainEvent::TaskCompleted { .. }));
    if completed_now {
        if let Some(parent_id) = saved.parent_id.clone() {
            events.push(DomainEvent::SubtaskProgressAggregated {
                parent_id,
                subtask_id: saved.id.clone(),
                subtask_progress: 100,
                note: ProgressAggregator::propagation_note(&saved.id, 100, &saved.title),
            });
        }
    }

    let processed = services.bus.dispatch_committed(events, now).await;
    Ok((saved, processed))
}
