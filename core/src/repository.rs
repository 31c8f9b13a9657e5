use async_trait::async_trait;

use crate::{
    error::Result,
    models::{
        Agent, Assignment, AssignmentConflict, Handoff, HintFeedback, NewTask, Task, TaskContext,
        TaskFilter, VisionAlignment, VisionHierarchy, VisionObjective, WorkflowHint,
    },
};

/// Repository port for the task aggregate.
///
/// Implementations must be thread-safe and support concurrent access.
/// Mutations on a single task are linearised through the version token:
/// `update_with_version` is the only write path use-cases take for existing
/// tasks, and a lost race must surface as
/// [`ConcurrentModification`](crate::error::OrchestrationError::ConcurrentModification).
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task, assigning an opaque id and version 1
    ///
    /// # Returns
    /// * `Ok(Task)` - The created task with assigned id and timestamps
    /// * `Err(OrchestrationError::Validation)` - If the task data is invalid
    /// * `Err(OrchestrationError::StorageUnavailable)` - If the store fails
    async fn create(&self, task: NewTask) -> Result<Task>;

    /// Get a task by id
    ///
    /// # Returns
    /// * `Ok(Some(Task))` - The task if found
    /// * `Ok(None)` - If no task exists with that id
    async fn get(&self, id: &str) -> Result<Option<Task>>;

    /// Upsert a task unconditionally, bumping its version.
    ///
    /// Reserved for seeding and uncontended writes; contended paths go
    /// through `update_with_version`.
    async fn save(&self, task: Task) -> Result<Task>;

    /// Persist a task only if its stored version still equals
    /// `expected_version`; bumps the version on success
    ///
    /// # Returns
    /// * `Ok(Task)` - The persisted task with its new version
    /// * `Err(OrchestrationError::NotFound)` - If the task doesn't exist
    /// * `Err(OrchestrationError::ConcurrentModification)` - If another
    ///   writer committed since the caller's read
    async fn update_with_version(&self, task: Task, expected_version: u64) -> Result<Task>;

    /// List tasks on a branch matching the filter
    async fn find_by_branch(&self, branch_id: &str, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Direct children of a task, in creation order
    async fn find_children(&self, parent_id: &str) -> Result<Vec<Task>>;

    /// List tasks matching the given filter criteria
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Delete a task by id. Cascading to subtasks is the use-case's job;
    /// the store removes exactly the named row.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Get repository health status for monitoring
    async fn health_check(&self) -> Result<()>;
}

/// Repository port for task contexts (1:1 with tasks, created lazily)
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn get_by_task(&self, task_id: &str) -> Result<Option<TaskContext>>;

    /// Upsert the context for its task
    async fn save(&self, context: TaskContext) -> Result<TaskContext>;

    /// Remove the context when its task is deleted
    async fn delete_by_task(&self, task_id: &str) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

/// Repository port for the vision hierarchy and materialised alignments
#[async_trait]
pub trait VisionRepository: Send + Sync {
    /// Load the whole objective tree
    async fn get_hierarchy(&self) -> Result<VisionHierarchy>;

    async fn get_objective(&self, id: &str) -> Result<Option<VisionObjective>>;

    /// Replace the materialised alignment set for a task
    async fn save_alignment(&self, task_id: &str, alignments: Vec<VisionAlignment>) -> Result<()>;

    async fn get_alignment(&self, task_id: &str) -> Result<Option<Vec<VisionAlignment>>>;

    async fn health_check(&self) -> Result<()>;
}

/// Repository port for agents, assignments, handoffs, and conflicts
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Agent>>;

    async fn save(&self, agent: Agent) -> Result<Agent>;

    /// Agents whose status is not offline
    async fn find_available(&self) -> Result<Vec<Agent>>;

    /// Current primary assignment of a task, if any
    async fn assignment_for(&self, task_id: &str) -> Result<Option<Assignment>>;

    /// Write the primary assignment for a task.
    ///
    /// `expected_current` names the agent the caller believes holds the
    /// assignment (`None` = believed vacant). A mismatch means another
    /// writer got there first and must surface as
    /// [`ConcurrentModification`](crate::error::OrchestrationError::ConcurrentModification)
    /// so the coordinator can raise a conflict.
    async fn save_assignment(
        &self,
        assignment: Assignment,
        expected_current: Option<String>,
    ) -> Result<Assignment>;

    /// Remove a task's primary assignment (task deletion path)
    async fn remove_assignment(&self, task_id: &str) -> Result<()>;

    /// All assignments currently held by an agent
    async fn assignments_for_agent(&self, agent_id: &str) -> Result<Vec<Assignment>>;

    /// Persist a handoff, assigning an id when empty
    async fn save_handoff(&self, handoff: Handoff) -> Result<Handoff>;

    async fn get_handoff(&self, id: &str) -> Result<Option<Handoff>>;

    /// Non-terminal handoffs where the agent is sender or recipient
    async fn open_handoffs_for_agent(&self, agent_id: &str) -> Result<Vec<Handoff>>;

    /// Persist a conflict, assigning an id when empty
    async fn save_conflict(&self, conflict: AssignmentConflict) -> Result<AssignmentConflict>;

    async fn get_conflict(&self, id: &str) -> Result<Option<AssignmentConflict>>;

    /// Unresolved conflicts on a task, oldest first
    async fn open_conflicts_for(&self, task_id: &str) -> Result<Vec<AssignmentConflict>>;

    async fn health_check(&self) -> Result<()>;
}

/// Optional hint persistence for effectiveness analytics
#[async_trait]
pub trait HintRepository: Send + Sync {
    /// Persist a hint, assigning an id when empty
    async fn save(&self, hint: WorkflowHint) -> Result<WorkflowHint>;

    async fn get(&self, id: &str) -> Result<Option<WorkflowHint>>;

    /// Record caller feedback; later feedback on the same hint overwrites
    ///
    /// # Returns
    /// * `Err(OrchestrationError::NotFound)` - If the hint id is unknown
    async fn mark_feedback(&self, feedback: HintFeedback) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}
