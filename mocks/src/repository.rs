//! Recording repository wrappers.
//!
//! Each wrapper delegates to a real (usually in-memory) implementation and
//! adds error injection for failure testing plus call-history tracking for
//! verification.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use orchestration_core::{
    error::{OrchestrationError, Result},
    models::{
        Agent, Assignment, AssignmentConflict, Handoff, NewTask, Task, TaskFilter,
    },
    repository::{AgentRepository, TaskRepository},
};

/// Task repository wrapper with error injection and call tracking
pub struct RecordingTaskRepository {
    inner: Arc<dyn TaskRepository>,
    error_injection: Mutex<Option<OrchestrationError>>,
    call_history: Mutex<Vec<String>>,
}

impl RecordingTaskRepository {
    pub fn new(inner: Arc<dyn TaskRepository>) -> Self {
        Self {
            inner,
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next repository call with the given error
    pub fn inject_error(&self, error: OrchestrationError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.error_injection.lock() = None;
    }

    /// Get history of called methods
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.lock().clear();
    }

    /// Assert method was called
    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call.contains(method)),
            "Method '{method}' was not called. Call history: {history:?}",
        );
    }

    fn record(&self, call: String) -> Result<()> {
        self.call_history.lock().push(call);
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for RecordingTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task> {
        self.record(format!("create(title={})", task.title))?;
        self.inner.create(task).await
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        self.record(format!("get(id={id})"))?;
        self.inner.get(id).await
    }

    async fn save(&self, task: Task) -> Result<Task> {
        self.record(format!("save(id={})", task.id))?;
        self.inner.save(task).await
    }

    async fn update_with_version(&self, task: Task, expected_version: u64) -> Result<Task> {
        self.record(format!(
            "update_with_version(id={}, expected={expected_version})",
            task.id
        ))?;
        self.inner.update_with_version(task, expected_version).await
    }

    async fn find_by_branch(&self, branch_id: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        self.record(format!("find_by_branch(branch={branch_id})"))?;
        self.inner.find_by_branch(branch_id, filter).await
    }

    async fn find_children(&self, parent_id: &str) -> Result<Vec<Task>> {
        self.record(format!("find_children(parent={parent_id})"))?;
        self.inner.find_children(parent_id).await
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.record("list()".to_string())?;
        self.inner.list(filter).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.record(format!("delete(id={id})"))?;
        self.inner.delete(id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check()".to_string())?;
        self.inner.health_check().await
    }
}

/// Agent repository wrapper with error injection and call tracking
pub struct RecordingAgentRepository {
    inner: Arc<dyn AgentRepository>,
    error_injection: Mutex<Option<OrchestrationError>>,
    call_history: Mutex<Vec<String>>,
}

impl RecordingAgentRepository {
    pub fn new(inner: Arc<dyn AgentRepository>) -> Self {
        Self {
            inner,
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn inject_error(&self, error: OrchestrationError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.call_history.lock().push(call);
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for RecordingAgentRepository {
    async fn get(&self, id: &str) -> Result<Option<Agent>> {
        self.record(format!("get(id={id})"))?;
        self.inner.get(id).await
    }

    async fn save(&self, agent: Agent) -> Result<Agent> {
        self.record(format!("save(id={})", agent.id))?;
        self.inner.save(agent).await
    }

    async fn find_available(&self) -> Result<Vec<Agent>> {
        self.record("find_available()".to_string())?;
        self.inner.find_available().await
    }

    async fn assignment_for(&self, task_id: &str) -> Result<Option<Assignment>> {
        self.record(format!("assignment_for(task={task_id})"))?;
        self.inner.assignment_for(task_id).await
    }

    async fn save_assignment(
        &self,
        assignment: Assignment,
        expected_current: Option<String>,
    ) -> Result<Assignment> {
        self.record(format!(
            "save_assignment(task={}, agent={})",
            assignment.task_id, assignment.agent_id
        ))?;
        self.inner.save_assignment(assignment, expected_current).await
    }

    async fn remove_assignment(&self, task_id: &str) -> Result<()> {
        self.record(format!("remove_assignment(task={task_id})"))?;
        self.inner.remove_assignment(task_id).await
    }

    async fn assignments_for_agent(&self, agent_id: &str) -> Result<Vec<Assignment>> {
        self.record(format!("assignments_for_agent(agent={agent_id})"))?;
        self.inner.assignments_for_agent(agent_id).await
    }

    async fn save_handoff(&self, handoff: Handoff) -> Result<Handoff> {
        self.record(format!("save_handoff(task={})", handoff.task_id))?;
        self.inner.save_handoff(handoff).await
    }

    async fn get_handoff(&self, id: &str) -> Result<Option<Handoff>> {
        self.record(format!("get_handoff(id={id})"))?;
        self.inner.get_handoff(id).await
    }

    async fn open_handoffs_for_agent(&self, agent_id: &str) -> Result<Vec<Handoff>> {
        self.record(format!("open_handoffs_for_agent(agent={agent_id})"))?;
        self.inner.open_handoffs_for_agent(agent_id).await
    }

    async fn save_conflict(&self, conflict: AssignmentConflict) -> Result<AssignmentConflict> {
        self.record(format!("save_conflict(task={})", conflict.task_id))?;
        self.inner.save_conflict(conflict).await
    }

    async fn get_conflict(&self, id: &str) -> Result<Option<AssignmentConflict>> {
        self.record(format!("get_conflict(id={id})"))?;
        self.inner.get_conflict(id).await
    }

    async fn open_conflicts_for(&self, task_id: &str) -> Result<Vec<AssignmentConflict>> {
        self.record(format!("open_conflicts_for(task={task_id})"))?;
        self.inner.open_conflicts_for(task_id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check()".to_string())?;
        self.inner.health_check().await
    }
}
