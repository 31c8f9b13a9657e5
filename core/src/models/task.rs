use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::{Milestone, ProgressTimeline};

/// Central task aggregate of the orchestration engine.
///
/// A task is the unit of work agents create, report progress on, hand off,
/// and complete. It exclusively owns its progress timeline and milestones;
/// the companion [`TaskContext`](super::context::TaskContext) record is
/// created lazily on first mutation and shares the task's lifetime.
///
/// A task whose `parent_id` is set is a subtask and obeys every task
/// invariant; the parent keeps an id-keyed list of its children and a
/// subtask cannot outlive its parent.
///
/// # Examples
///
/// ```rust
/// use orchestration_core::models::{Task, TaskStatus};
/// use chrono::Utc;
///
/// let task = Task::seed("task-000001", "Implement auth", "JWT-based auth", "branch-main", Utc::now());
/// assert_eq!(task.status, TaskStatus::Todo);
/// assert!(task.can_transition_to(TaskStatus::InProgress));
/// assert!(!task.can_transition_to(TaskStatus::Review));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Opaque, stable, human-safe identifier
    pub id: String,
    /// Brief task title
    pub title: String,
    /// Detailed task requirements
    pub description: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Scheduling priority
    pub priority: Priority,
    /// Aggregate progress in percent, 0..=100
    pub overall_progress: u8,
    /// Owning task tree
    pub branch_id: String,
    /// Currently assigned agent, if any
    pub assignee: Option<String>,
    /// Parent task id when this task is a subtask
    pub parent_id: Option<String>,
    /// Child subtask ids in creation order (ordering carries no semantics)
    #[serde(default)]
    pub subtask_ids: Vec<String>,
    /// Free-form labels; a "maintenance" label affects vision contribution
    #[serde(default)]
    pub labels: Vec<String>,
    /// Named progress thresholds with idempotent firing records
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    /// Append-only progress snapshot log owned by this task
    #[serde(default)]
    pub timeline: ProgressTimeline,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Advances monotonically on every state mutation
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every persisted write
    pub version: u64,
}

/// Task lifecycle statuses.
///
/// `Done` and `Cancelled` are terminal. Reaching `Done` is additionally
/// gated on a non-empty completion summary and on every subtask being done;
/// those gates live in the context enforcer, not in the transition graph.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Review,
    Done,
    Cancelled,
}

/// Task priority levels, lowest to highest.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    /// Normalised rank in (0, 1], used by vision alignment and work routing
    pub fn rank(&self) -> f64 {
        match self {
            Priority::Low => 0.2,
            Priority::Medium => 0.4,
            Priority::High => 0.6,
            Priority::Urgent => 0.8,
            Priority::Critical => 1.0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Task {
    /// Build a fresh `todo` task. Storage assigns ids in production paths;
    /// this constructor is the seam tests and stores share.
    pub fn seed(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        branch_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            overall_progress: 0,
            branch_id: branch_id.into(),
            assignee: None,
            parent_id: None,
            subtask_ids: Vec::new(),
            labels: Vec::new(),
            milestones: Milestone::defaults(),
            timeline: ProgressTimeline::default(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Check if the task can transition to the given status
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self.status, new_status) {
            // Can't transition to the same status
            (current, new) if current == new => false,

            (Todo, InProgress | Cancelled) => true,
            (InProgress, Blocked | Review | Done | Cancelled) => true,
            (Blocked, InProgress | Cancelled) => true,
            (Review, InProgress | Done | Cancelled) => true,

            // Done and Cancelled are terminal
            (Done | Cancelled, _) => false,

            _ => false,
        }
    }

    /// Whether the task is in a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Whether any self-reported progress exists on the timeline
    pub fn has_reported_progress(&self) -> bool {
        !self.timeline.snapshots.is_empty()
    }

    /// Advance `updated_at`; every mutating use-case calls this before
    /// persisting so the timestamp stays monotonic
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Whether the task carries a "maintenance" label
    pub fn is_maintenance(&self) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case("maintenance"))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Data transfer object for creating new tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub branch_id: String,
    pub assignee: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Custom milestone set; the default thresholds are used when empty
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

/// Data transfer object for partial task updates; only `Some` fields apply
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
}

/// Filter criteria for querying tasks.
///
/// All fields are optional; when several are given they combine with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub branch_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    /// Maximum number of tasks to return
    pub limit: Option<u32>,
    /// Number of tasks to skip
    pub offset: Option<u32>,
}

impl TaskFilter {
    /// Whether a task matches every populated criterion
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(branch) = &self.branch_id {
            if &task.branch_id != branch {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if task.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_in(status: TaskStatus) -> Task {
        let mut t = Task::seed("task-000001", "Test", "Test task", "branch-1", Utc::now());
        t.status = status;
        t
    }

    #[test]
    fn test_valid_status_transitions() {
        let task = task_in(TaskStatus::Todo);
        assert!(task.can_transition_to(TaskStatus::InProgress));
        assert!(task.can_transition_to(TaskStatus::Cancelled));
        assert!(!task.can_transition_to(TaskStatus::Blocked));
        assert!(!task.can_transition_to(TaskStatus::Review));
        assert!(!task.can_transition_to(TaskStatus::Done));

        let task = task_in(TaskStatus::InProgress);
        assert!(task.can_transition_to(TaskStatus::Blocked));
        assert!(task.can_transition_to(TaskStatus::Review));
        assert!(task.can_transition_to(TaskStatus::Done));
        assert!(task.can_transition_to(TaskStatus::Cancelled));
        assert!(!task.can_transition_to(TaskStatus::Todo));

        let task = task_in(TaskStatus::Blocked);
        assert!(task.can_transition_to(TaskStatus::InProgress));
        assert!(!task.can_transition_to(TaskStatus::Done));

        let task = task_in(TaskStatus::Review);
        assert!(task.can_transition_to(TaskStatus::InProgress));
        assert!(task.can_transition_to(TaskStatus::Done));
        assert!(!task.can_transition_to(TaskStatus::Blocked));
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        for terminal in [TaskStatus::Done, TaskStatus::Cancelled] {
            let task = task_in(terminal);
            assert!(task.is_terminal());
            for target in [
                TaskStatus::Todo,
                TaskStatus::InProgress,
                TaskStatus::Blocked,
                TaskStatus::Review,
                TaskStatus::Done,
                TaskStatus::Cancelled,
            ] {
                assert!(!task.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_no_same_status_transition() {
        let task = task_in(TaskStatus::InProgress);
        assert!(!task.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let now = Utc::now();
        let mut task = Task::seed("task-000001", "Test", "Test task", "branch-1", now);
        let later = now + chrono::Duration::seconds(5);
        task.touch(later);
        assert_eq!(task.updated_at, later);
        // An earlier clock reading never rewinds the timestamp
        task.touch(now);
        assert_eq!(task.updated_at, later);
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let mut task = Task::seed("task-000001", "Test", "Test task", "branch-1", now);
        task.assignee = Some("agent-1".to_string());

        let filter = TaskFilter {
            branch_id: Some("branch-1".to_string()),
            assignee: Some("agent-1".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        let filter = TaskFilter {
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        assert!(!filter.matches(&task));
    }
}
