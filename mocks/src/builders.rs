//! Fluent builders for realistic test entities.

use chrono::{DateTime, Utc};
use fake::faker::lorem::en::Sentence;
use fake::Fake;

use orchestration_core::models::{
    Agent, AgentAvailability, ObjectiveStatus, Priority, ProgressNote, ProgressSnapshot,
    ProgressType, SnapshotMetadata, TargetMetric, Task, TaskContext, TaskStatus, VisionLevel,
    VisionObjective,
};

/// Builder for [`Task`] with fake-but-plausible defaults
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        let title: String = Sentence(2..5).fake();
        let description: String = Sentence(6..12).fake();
        Self {
            task: Task::seed(id, title, description, "branch-main", now),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.task.description = description.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        if status == TaskStatus::Done {
            self.task.overall_progress = 100;
        }
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn branch(mut self, branch_id: &str) -> Self {
        self.task.branch_id = branch_id.to_string();
        self
    }

    pub fn parent(mut self, parent_id: &str) -> Self {
        self.task.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn assignee(mut self, agent_id: &str) -> Self {
        self.task.assignee = Some(agent_id.to_string());
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.task.labels = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn subtasks(mut self, ids: &[&str]) -> Self {
        self.task.subtask_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn progress(mut self, percentage: u8) -> Self {
        self.task.overall_progress = percentage;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.created_at = at;
        self.task.updated_at = at;
        self
    }

    /// Append a general self-reported snapshot so the task counts as
    /// having reported progress
    pub fn reported(mut self, percentage: u8) -> Self {
        let id = self.task.timeline.next_snapshot_id(&self.task.id);
        self.task.timeline.push(ProgressSnapshot {
            id,
            task_id: self.task.id.clone(),
            progress_type: ProgressType::General,
            percentage: Some(percentage),
            description: "self-reported".to_string(),
            metadata: SnapshotMetadata::default(),
            timestamp: self.task.updated_at,
            agent_id: None,
        });
        self.task.overall_progress = percentage;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            agent: Agent {
                id: id.to_string(),
                role: "developer".to_string(),
                expertise: vec![],
                current_load: 0.0,
                status: AgentAvailability::Available,
                capabilities: vec![],
            },
        }
    }

    pub fn role(mut self, role: &str) -> Self {
        self.agent.role = role.to_string();
        self
    }

    pub fn expertise(mut self, expertise: &[&str]) -> Self {
        self.agent.expertise = expertise.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn capabilities(mut self, capabilities: &[&str]) -> Self {
        self.agent.capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn load(mut self, load: f64) -> Self {
        self.agent.current_load = load;
        self
    }

    pub fn status(mut self, status: AgentAvailability) -> Self {
        self.agent.status = status;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

/// Builder for [`VisionObjective`]
pub struct ObjectiveBuilder {
    objective: VisionObjective,
}

impl ObjectiveBuilder {
    pub fn new(id: &str, level: VisionLevel) -> Self {
        Self {
            objective: VisionObjective {
                id: id.to_string(),
                level,
                title: Sentence(2..4).fake(),
                description: Sentence(5..10).fake(),
                parent_id: None,
                metrics: vec![],
                deadline: None,
                status: ObjectiveStatus::Active,
            },
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.objective.title = title.to_string();
        self
    }

    pub fn parent(mut self, parent_id: &str) -> Self {
        self.objective.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn metric(mut self, name: &str, current: f64, target: f64, unit: &str) -> Self {
        self.objective.metrics.push(TargetMetric {
            name: name.to_string(),
            current,
            target,
            unit: unit.to_string(),
        });
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.objective.deadline = Some(deadline);
        self
    }

    pub fn status(mut self, status: ObjectiveStatus) -> Self {
        self.objective.status = status;
        self
    }

    pub fn build(self) -> VisionObjective {
        self.objective
    }
}

/// Builder for [`TaskContext`]
pub struct ContextBuilder {
    context: TaskContext,
}

impl ContextBuilder {
    pub fn new(task_id: &str) -> Self {
        Self {
            context: TaskContext::new(task_id, Utc::now()),
        }
    }

    pub fn last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.context.last_updated = at;
        self
    }

    pub fn completion_summary(mut self, summary: &str) -> Self {
        self.context.completion_summary = Some(summary.to_string());
        self
    }

    pub fn note(mut self, at: DateTime<Utc>, text: &str, percentage: Option<u8>) -> Self {
        self.context.push_note(ProgressNote {
            timestamp: at,
            agent_id: None,
            text: text.to_string(),
            progress_type: ProgressType::General,
            percentage,
        });
        self
    }

    pub fn build(self) -> TaskContext {
        self.context
    }
}
