//! Work assignment, handoff protocol, and conflict resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::{OrchestrationError, Result},
    events::DomainEvent,
    models::{
        Agent, AgentAvailability, Assignment, AssignmentConflict, ConflictStrategy, Handoff,
        HandoffState, Task,
    },
    repository::AgentRepository,
};

/// Sentinel agent id asking the coordinator to pick the best available agent
pub const AUTO_AGENT: &str = "auto";

/// Routes work among agents: primary assignments, structured handoffs, and
/// conflict records when two writers collide on one task.
pub struct AgentCoordinator {
    agents: Arc<dyn AgentRepository>,
}

impl AgentCoordinator {
    pub fn new(agents: Arc<dyn AgentRepository>) -> Self {
        Self { agents }
    }

    /// Suitability of an agent for a task in a given role:
    /// 0.4·(1−load) + 0.4·expertise + 0.2·role.
    ///
    /// Expertise is the fraction of the task's labels covered by the
    /// agent's expertise set (1.0 when the task has no labels); role is 1.0
    /// on exact match, 0.5 when listed among the agent's capabilities.
    pub fn suitability(agent: &Agent, task: &Task, role: &str) -> f64 {
        let load_term = 1.0 - agent.current_load.clamp(0.0, 1.0);

        let expertise_term = if task.labels.is_empty() {
            1.0
        } else {
            let covered = task
                .labels
                .iter()
                .filter(|label| {
                    agent
                        .expertise
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(label))
                })
                .count();
            covered as f64 / task.labels.len() as f64
        };

        let role_term = if agent.role.eq_ignore_ascii_case(role) {
            1.0
        } else if agent
            .capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(role))
        {
            0.5
        } else {
            0.0
        };

        0.4 * load_term + 0.4 * expertise_term + 0.2 * role_term
    }

    /// Best available agent for a task by suitability; ties break toward
    /// lower load, then lexicographic agent id
    pub async fn pick_agent(&self, task: &Task, role: &str) -> Result<Agent> {
        let candidates = self.agents.find_available().await?;
        candidates
            .into_iter()
            .filter(|a| a.status != AgentAvailability::Offline)
            .max_by(|a, b| {
                let sa = Self::suitability(a, task, role);
                let sb = Self::suitability(b, task, role);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Lower load wins a tie, so reversed under max_by
                    .then_with(|| {
                        b.current_load
                            .partial_cmp(&a.current_load)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| b.id.cmp(&a.id))
            })
            .ok_or_else(|| {
                OrchestrationError::AgentUnavailable(format!(
                    "no agent is available for task {}",
                    task.id
                ))
            })
    }

    /// Record the primary assignment for a task, replacing any incumbent.
    ///
    /// Losing the write race records a conflict and fails with
    /// `ASSIGNMENT_CONFLICT`; the conflict id is carried in the error.
    pub async fn assign(
        &self,
        task: &Task,
        agent: &Agent,
        role: &str,
        responsibilities: Vec<String>,
        assigned_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Assignment, Vec<DomainEvent>)> {
        if agent.status == AgentAvailability::Offline {
            return Err(OrchestrationError::AgentUnavailable(agent.id.clone()));
        }

        let incumbent = self.agents.assignment_for(&task.id).await?;
        let assignment = Assignment {
            task_id: task.id.clone(),
            agent_id: agent.id.clone(),
            role: role.to_string(),
            responsibilities,
            assigned_at: now,
            assigned_by,
        };

        let expected = incumbent.as_ref().map(|a| a.agent_id.clone());
        match self
            .agents
            .save_assignment(assignment.clone(), expected)
            .await
        {
            Ok(saved) => {
                let mut events = Vec::new();
                if let Some(previous) = incumbent {
                    if previous.agent_id != saved.agent_id {
                        events.push(DomainEvent::AgentUnassigned {
                            task_id: task.id.clone(),
                            agent_id: previous.agent_id,
                        });
                    }
                }
                events.push(DomainEvent::AgentAssigned {
                    task_id: task.id.clone(),
                    agent_id: saved.agent_id.clone(),
                });
                Ok((saved, events))
            }
            Err(OrchestrationError::ConcurrentModification(_)) => {
                // Someone else won the slot between our read and write
                let current = self.agents.assignment_for(&task.id).await?.ok_or_else(|| {
                    OrchestrationError::ConcurrentModification(format!("task {}", task.id))
                })?;
                let conflict = self
                    .agents
                    .save_conflict(AssignmentConflict {
                        id: String::new(),
                        task_id: task.id.clone(),
                        incumbent: current,
                        challenger: assignment,
                        detected_at: now,
                        strategy: None,
                        resolved_by: None,
                        resolved_at: None,
                        details: None,
                    })
                    .await?;
                Err(OrchestrationError::AssignmentConflict {
                    task_id: task.id.clone(),
                    conflict_id: conflict.id,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Open a handoff in `requested` state
    pub async fn request_handoff(
        &self,
        task: &Task,
        from_agent: &str,
        to_agent: &Agent,
        work_summary: String,
        completed_items: Vec<String>,
        remaining_items: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(Handoff, Vec<DomainEvent>)> {
        if to_agent.status == AgentAvailability::Offline {
            return Err(OrchestrationError::AgentUnavailable(to_agent.id.clone()));
        }
        if work_summary.trim().is_empty() {
            return Err(OrchestrationError::empty_field("work_summary"));
        }

        let handoff = self
            .agents
            .save_handoff(Handoff {
                id: String::new(),
                task_id: task.id.clone(),
                from_agent: from_agent.to_string(),
                to_agent: to_agent.id.clone(),
                work_summary,
                completed_items,
                remaining_items,
                state: HandoffState::Requested,
                requested_at: now,
                resolved_at: None,
                rejection_reason: None,
            })
            .await?;

        let events = vec![DomainEvent::HandoffRequested {
            handoff_id: handoff.id.clone(),
            task_id: task.id.clone(),
            from_agent: handoff.from_agent.clone(),
            to_agent: handoff.to_agent.clone(),
        }];
        Ok((handoff, events))
    }

    /// Recipient confirms: requested → accepted, and the primary
    /// assignment transfers with the state change
    pub async fn accept_handoff(
        &self,
        mut handoff: Handoff,
        now: DateTime<Utc>,
    ) -> Result<(Handoff, Vec<DomainEvent>)> {
        Self::check_transition(&handoff, HandoffState::Accepted, "accept")?;
        handoff.state = HandoffState::Accepted;

        let incumbent = self.agents.assignment_for(&handoff.task_id).await?;
        let assignment = Assignment {
            task_id: handoff.task_id.clone(),
            agent_id: handoff.to_agent.clone(),
            role: incumbent
                .as_ref()
                .map(|a| a.role.clone())
                .unwrap_or_else(|| "contributor".to_string()),
            responsibilities: incumbent
                .as_ref()
                .map(|a| a.responsibilities.clone())
                .unwrap_or_default(),
            assigned_at: now,
            assigned_by: Some(handoff.from_agent.clone()),
        };
        self.agents
            .save_assignment(assignment, incumbent.as_ref().map(|a| a.agent_id.clone()))
            .await?;
        let handoff = self.agents.save_handoff(handoff).await?;

        let events = vec![
            DomainEvent::HandoffAccepted {
                handoff_id: handoff.id.clone(),
                task_id: handoff.task_id.clone(),
            },
            DomainEvent::AgentUnassigned {
                task_id: handoff.task_id.clone(),
                agent_id: handoff.from_agent.clone(),
            },
            DomainEvent::AgentAssigned {
                task_id: handoff.task_id.clone(),
                agent_id: handoff.to_agent.clone(),
            },
        ];
        Ok((handoff, events))
    }

    /// Recipient declines: requested → rejected; the original assignment
    /// is retained and the reason recorded
    pub async fn reject_handoff(
        &self,
        mut handoff: Handoff,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Handoff, Vec<DomainEvent>)> {
        Self::check_transition(&handoff, HandoffState::Rejected, "reject")?;
        handoff.state = HandoffState::Rejected;
        handoff.resolved_at = Some(now);
        handoff.rejection_reason = reason.clone();
        let handoff = self.agents.save_handoff(handoff).await?;

        let events = vec![DomainEvent::HandoffRejected {
            handoff_id: handoff.id.clone(),
            task_id: handoff.task_id.clone(),
            reason,
        }];
        Ok((handoff, events))
    }

    /// Originator closes the loop: accepted → completed. The caller merges
    /// the work summary into the task context.
    pub async fn complete_handoff(
        &self,
        mut handoff: Handoff,
        now: DateTime<Utc>,
    ) -> Result<(Handoff, Vec<DomainEvent>)> {
        Self::check_transition(&handoff, HandoffState::Completed, "complete")?;
        handoff.state = HandoffState::Completed;
        handoff.resolved_at = Some(now);
        let handoff = self.agents.save_handoff(handoff).await?;

        let events = vec![DomainEvent::HandoffCompleted {
            handoff_id: handoff.id.clone(),
            task_id: handoff.task_id.clone(),
        }];
        Ok((handoff, events))
    }

    /// Apply a resolution strategy to an open conflict. `manual` records
    /// the choice but leaves the conflict open for escalation.
    pub async fn resolve_conflict(
        &self,
        mut conflict: AssignmentConflict,
        strategy: ConflictStrategy,
        resolved_by: String,
        details: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(AssignmentConflict, Vec<DomainEvent>)> {
        if !conflict.is_open() {
            return Err(OrchestrationError::Validation(format!(
                "conflict {} is already resolved",
                conflict.id
            )));
        }

        conflict.strategy = Some(strategy);
        conflict.details = details;

        let winner = match strategy {
            ConflictStrategy::FirstWriterWins => Some(conflict.incumbent.clone()),
            ConflictStrategy::LastWriterWins => Some(conflict.challenger.clone()),
            ConflictStrategy::Merge => {
                let mut merged = conflict.incumbent.clone();
                for r in &conflict.challenger.responsibilities {
                    if !merged.responsibilities.contains(r) {
                        merged.responsibilities.push(r.clone());
                    }
                }
                Some(merged)
            }
            ConflictStrategy::Manual => None,
        };

        let mut events = Vec::new();
        if let Some(assignment) = winner {
            let current = self.agents.assignment_for(&conflict.task_id).await?;
            self.agents
                .save_assignment(assignment, current.map(|a| a.agent_id))
                .await?;
            conflict.resolved_by = Some(resolved_by);
            conflict.resolved_at = Some(now);
            events.push(DomainEvent::ConflictResolved {
                conflict_id: conflict.id.clone(),
                task_id: conflict.task_id.clone(),
                strategy,
            });
        }

        let conflict = self.agents.save_conflict(conflict).await?;
        Ok((conflict, events))
    }

    fn check_transition(handoff: &Handoff, target: HandoffState, action: &str) -> Result<()> {
        if handoff.state.can_transition_to(target) {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidHandoffState {
                handoff_id: handoff.id.clone(),
                state: handoff.state,
                action: action.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, role: &str, load: f64, expertise: &[&str]) -> Agent {
        Agent {
            id: id.to_string(),
            role: role.to_string(),
            expertise: expertise.iter().map(|s| s.to_string()).collect(),
            current_load: load,
            status: AgentAvailability::Available,
            capabilities: vec![],
        }
    }

    fn task_with_labels(labels: &[&str]) -> Task {
        let mut t = Task::seed("task-1", "Work", "Work item", "branch-1", Utc::now());
        t.labels = labels.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn test_suitability_formula() {
        let task = task_with_labels(&["rust", "async"]);
        let a = agent("agent-a", "developer", 0.5, &["rust"]);

        // 0.4*(1-0.5) + 0.4*(1/2) + 0.2*1.0
        let s = AgentCoordinator::suitability(&a, &task, "developer");
        assert!((s - 0.6).abs() < 1e-9);

        // No labels -> expertise term is 1.0
        let unlabelled = task_with_labels(&[]);
        let s = AgentCoordinator::suitability(&a, &unlabelled, "reviewer");
        assert!((s - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_role_capability_counts_half() {
        let task = task_with_labels(&[]);
        let mut a = agent("agent-a", "developer", 0.0, &[]);
        a.capabilities = vec!["reviewer".to_string()];

        let s = AgentCoordinator::suitability(&a, &task, "reviewer");
        // 0.4*1.0 + 0.4*1.0 + 0.2*0.5
        assert!((s - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_handoff_guard_produces_typed_error() {
        let handoff = Handoff {
            id: "handoff-0001".to_string(),
            task_id: "task-1".to_string(),
            from_agent: "agent-a".to_string(),
            to_agent: "agent-b".to_string(),
            work_summary: "half done".to_string(),
            completed_items: vec![],
            remaining_items: vec![],
            state: HandoffState::Requested,
            requested_at: Utc::now(),
            resolved_at: None,
            rejection_reason: None,
        };

        // requested -> completed is not in the graph
        let err =
            AgentCoordinator::check_transition(&handoff, HandoffState::Completed, "complete")
                .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::InvalidHandoffState { .. }
        ));

        assert!(
            AgentCoordinator::check_transition(&handoff, HandoffState::Accepted, "accept").is_ok()
        );
    }
}
