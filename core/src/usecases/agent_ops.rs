//! Agent coordination tools: assignment, handoffs, workload, conflicts,
//! and status broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    coordination::AUTO_AGENT,
    error::{OrchestrationError, Result},
    events::DomainEvent,
    models::{Agent, Handoff, ProgressNote, ProgressType},
    protocol::{
        decode_params, AssignAgentParams, BroadcastStatusParams, GetAgentWorkloadParams,
        HandoffActionParams, RequestHandoffParams, ResolveConflictParams,
    },
};

use super::{load_or_new_context, load_task, mutate_task, EngineDeps, EngineServices, UseCase};

async fn load_agent(deps: &EngineDeps, agent_id: &str) -> Result<Agent> {
    deps.agents
        .get(agent_id)
        .await?
        .ok_or_else(|| OrchestrationError::agent_not_found(agent_id))
}

async fn load_handoff(deps: &EngineDeps, handoff_id: &str) -> Result<Handoff> {
    deps.agents
        .get_handoff(handoff_id)
        .await?
        .ok_or_else(|| OrchestrationError::handoff_not_found(handoff_id))
}

/// Creates or replaces a task's primary assignment
pub struct AssignAgentToTask {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl AssignAgentToTask {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for AssignAgentToTask {
    fn name(&self) -> &'static str {
        "assign_agent_to_task"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: AssignAgentParams = decode_params(raw)?;
        let task = load_task(&self.deps, &params.task_id).await?;

        let agent = if params.agent_id == AUTO_AGENT {
            self.services
                .coordinator
                .pick_agent(&task, &params.role)
                .await?
        } else {
            load_agent(&self.deps, &params.agent_id).await?
        };

        let (assignment, events) = self
            .services
            .coordinator
            .assign(
                &task,
                &agent,
                &params.role,
                params.responsibilities,
                params.assigned_by,
                now,
            )
            .await?;

        let agent_id = agent.id.clone();
        mutate_task(&self.deps, &params.task_id, move |mut task| {
            task.assignee = Some(agent_id.clone());
            task.touch(now);
            Ok((task, ()))
        })
        .await?;

        self.services.bus.dispatch_committed(events, now).await;
        tracing::info!(task_id = %params.task_id, agent_id = %agent.id, "agent assigned");
        Ok(json!({ "assignment": assignment }))
    }
}

/// Opens a structured ownership transfer between two agents
pub struct RequestWorkHandoff {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl RequestWorkHandoff {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for RequestWorkHandoff {
    fn name(&self) -> &'static str {
        "request_work_handoff"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: RequestHandoffParams = decode_params(raw)?;
        let task = load_task(&self.deps, &params.task_id).await?;
        load_agent(&self.deps, &params.from_agent_id).await?;
        let to_agent = load_agent(&self.deps, &params.to_agent_id).await?;

        // Only the current holder can hand the task off
        if let Some(assignment) = self.deps.agents.assignment_for(&task.id).await? {
            if assignment.agent_id != params.from_agent_id {
                return Err(OrchestrationError::Validation(format!(
                    "{} does not hold task {}; {} does",
                    params.from_agent_id, task.id, assignment.agent_id
                )));
            }
        }

        let (handoff, events) = self
            .services
            .coordinator
            .request_handoff(
                &task,
                &params.from_agent_id,
                &to_agent,
                params.work_summary,
                params.completed_items,
                params.remaining_items,
                now,
            )
            .await?;

        self.services.bus.dispatch_committed(events, now).await;
        Ok(json!({ "handoff": handoff }))
    }
}

/// Recipient accepts: ownership transfers atomically with the state change
pub struct AcceptHandoff {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl AcceptHandoff {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for AcceptHandoff {
    fn name(&self) -> &'static str {
        "accept_handoff"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: HandoffActionParams = decode_params(raw)?;
        let handoff = load_handoff(&self.deps, &params.handoff_id).await?;
        let (handoff, events) = self.services.coordinator.accept_handoff(handoff, now).await?;

        let new_assignee = handoff.to_agent.clone();
        let (task, _) = mutate_task(&self.deps, &handoff.task_id, move |mut task| {
            task.assignee = Some(new_assignee.clone());
            task.touch(now);
            Ok((task, ()))
        })
        .await?;

        self.services.bus.dispatch_committed(events, now).await;
        Ok(json!({ "handoff": handoff, "task": task }))
    }
}

/// Recipient declines; the original assignment is retained
pub struct RejectHandoff {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl RejectHandoff {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for RejectHandoff {
    fn name(&self) -> &'static str {
        "reject_handoff"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: HandoffActionParams = decode_params(raw)?;
        let handoff = load_handoff(&self.deps, &params.handoff_id).await?;
        let (handoff, events) = self
            .services
            .coordinator
            .reject_handoff(handoff, params.reason, now)
            .await?;
        self.services.bus.dispatch_committed(events, now).await;
        Ok(json!({ "handoff": handoff }))
    }
}

/// Originator closes an accepted handoff; the work summary lands in the
/// task context
pub struct CompleteHandoff {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl CompleteHandoff {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for CompleteHandoff {
    fn name(&self) -> &'static str {
        "complete_handoff"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: HandoffActionParams = decode_params(raw)?;
        let handoff = load_handoff(&self.deps, &params.handoff_id).await?;
        let (handoff, mut events) = self
            .services
            .coordinator
            .complete_handoff(handoff, now)
            .await?;

        let mut context = load_or_new_context(&self.deps, &handoff.task_id, now).await?;
        context.push_note(ProgressNote {
            timestamp: now,
            agent_id: Some(handoff.to_agent.clone()),
            text: format!(
                "Handoff from {} completed: {}",
                handoff.from_agent, handoff.work_summary
            ),
            progress_type: ProgressType::General,
            percentage: None,
        });
        self.deps.contexts.save(context).await?;
        events.push(DomainEvent::ContextUpdated {
            task_id: handoff.task_id.clone(),
        });

        self.services.bus.dispatch_committed(events, now).await;
        Ok(json!({ "handoff": handoff }))
    }
}

/// Current load report for one agent
pub struct GetAgentWorkload {
    deps: Arc<EngineDeps>,
}

impl GetAgentWorkload {
    pub fn new(deps: Arc<EngineDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl UseCase for GetAgentWorkload {
    fn name(&self) -> &'static str {
        "get_agent_workload"
    }

    async fn execute(&self, raw: Value, _now: DateTime<Utc>) -> Result<Value> {
        let params: GetAgentWorkloadParams = decode_params(raw)?;
        let agent = load_agent(&self.deps, &params.agent_id).await?;

        let assignments = self.deps.agents.assignments_for_agent(&agent.id).await?;
        let mut tasks_by_status: BTreeMap<String, usize> = BTreeMap::new();
        for assignment in &assignments {
            if let Some(task) = self.deps.tasks.get(&assignment.task_id).await? {
                *tasks_by_status.entry(task.status.to_string()).or_default() += 1;
            }
        }
        let open_handoffs = self.deps.agents.open_handoffs_for_agent(&agent.id).await?;

        Ok(json!({
            "agent_id": agent.id,
            "status": agent.status,
            "utilization": agent.current_load,
            "assigned_tasks": assignments.len(),
            "tasks_by_status": tasks_by_status,
            "open_handoffs": open_handoffs.len(),
        }))
    }
}

/// Applies a resolution strategy to an assignment conflict
pub struct ResolveConflict {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl ResolveConflict {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for ResolveConflict {
    fn name(&self) -> &'static str {
        "resolve_conflict"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: ResolveConflictParams = decode_params(raw)?;
        let conflict = self
            .deps
            .agents
            .get_conflict(&params.conflict_id)
            .await?
            .ok_or_else(|| OrchestrationError::conflict_not_found(&params.conflict_id))?;

        let (conflict, events) = self
            .services
            .coordinator
            .resolve_conflict(
                conflict,
                params.strategy,
                params.resolved_by,
                Some(params.details),
                now,
            )
            .await?;

        // Mirror the winning assignment onto the task aggregate
        if conflict.resolved_at.is_some() {
            if let Some(assignment) = self.deps.agents.assignment_for(&conflict.task_id).await? {
                let winner = assignment.agent_id.clone();
                mutate_task(&self.deps, &conflict.task_id, move |mut task| {
                    task.assignee = Some(winner.clone());
                    task.touch(now);
                    Ok((task, ()))
                })
                .await?;
            }
        }

        self.services.bus.dispatch_committed(events, now).await;
        Ok(json!({ "conflict": conflict }))
    }
}

/// Updates an agent's availability
pub struct BroadcastStatus {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl BroadcastStatus {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for BroadcastStatus {
    fn name(&self) -> &'static str {
        "broadcast_status"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: BroadcastStatusParams = decode_params(raw)?;
        let mut agent = load_agent(&self.deps, &params.agent_id).await?;
        agent.status = params.status;
        let agent = self.deps.agents.save(agent).await?;

        self.services
            .bus
            .dispatch_committed(
                vec![DomainEvent::AgentStatusChanged {
                    agent_id: agent.id.clone(),
                    status: agent.status,
                }],
                now,
            )
            .await;

        if let Some(message) = params.message {
            tracing::info!(agent_id = %agent.id, status = %agent.status, message = %message, "agent status broadcast");
        }
        Ok(json!({ "agent": agent }))
    }
}
