use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use orchestration_core::{
    error::{OrchestrationError, Result},
    models::{
        Agent, Assignment, AssignmentConflict, Handoff, HintFeedback, Milestone, NewTask, Task,
        TaskContext, TaskFilter, VisionAlignment, VisionHierarchy, VisionObjective, WorkflowHint,
    },
    repository::{
        AgentRepository, ContextRepository, HintRepository, TaskRepository, VisionRepository,
    },
    usecases::EngineDeps,
    EngineConfig,
};

/// Thread-safe in-memory task store with optimistic version checking
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<String, Task>>,
    next_id: AtomicU64,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn sorted_by_creation(mut tasks: Vec<Task>) -> Vec<Task> {
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskStore {
    async fn create(&self, new_task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let id = format!("task-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));

        let mut task = Task::seed(
            id.as_str(),
            new_task.title,
            new_task.description,
            new_task.branch_id,
            now,
        );
        task.priority = new_task.priority;
        task.assignee = new_task.assignee;
        task.parent_id = new_task.parent_id;
        task.labels = new_task.labels;
        if !new_task.milestones.is_empty() {
            task.milestones = new_task.milestones;
        } else {
            task.milestones = Milestone::defaults();
        }

        self.tasks.lock().insert(id, task.clone());
        tracing::debug!(task_id = %task.id, branch_id = %task.branch_id, "task row created");
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn save(&self, mut task: Task) -> Result<Task> {
        let mut tasks = self.tasks.lock();
        if let Some(stored) = tasks.get(&task.id) {
            task.version = stored.version + 1;
        } else {
            task.version = task.version.max(1);
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update_with_version(&self, mut task: Task, expected_version: u64) -> Result<Task> {
        let mut tasks = self.tasks.lock();
        let stored = tasks
            .get(&task.id)
            .ok_or_else(|| OrchestrationError::task_not_found(&task.id))?;
        if stored.version != expected_version {
            return Err(OrchestrationError::ConcurrentModification(format!(
                "task {}",
                task.id
            )));
        }
        task.version = expected_version + 1;
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn find_by_branch(&self, branch_id: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        let tasks: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.branch_id == branch_id && filter.matches(t))
            .cloned()
            .collect();
        Ok(Self::sorted_by_creation(tasks))
    }

    async fn find_children(&self, parent_id: &str) -> Result<Vec<Task>> {
        let tasks: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        Ok(Self::sorted_by_creation(tasks))
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let matching: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        let mut tasks = Self::sorted_by_creation(matching);
        if let Some(offset) = filter.offset {
            let offset = offset as usize;
            tasks = if offset < tasks.len() {
                tasks.split_off(offset)
            } else {
                Vec::new()
            };
        }
        if let Some(limit) = filter.limit {
            tasks.truncate(limit as usize);
        }
        Ok(tasks)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.tasks.lock().remove(id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory context store keyed by task id
#[derive(Default)]
pub struct MemoryContextStore {
    contexts: Mutex<HashMap<String, TaskContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextRepository for MemoryContextStore {
    async fn get_by_task(&self, task_id: &str) -> Result<Option<TaskContext>> {
        Ok(self.contexts.lock().get(task_id).cloned())
    }

    async fn save(&self, context: TaskContext) -> Result<TaskContext> {
        self.contexts
            .lock()
            .insert(context.task_id.clone(), context.clone());
        Ok(context)
    }

    async fn delete_by_task(&self, task_id: &str) -> Result<()> {
        self.contexts.lock().remove(task_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory vision store: one hierarchy plus materialised alignments
#[derive(Default)]
pub struct MemoryVisionStore {
    hierarchy: RwLock<VisionHierarchy>,
    alignments: Mutex<HashMap<String, Vec<VisionAlignment>>>,
}

impl MemoryVisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hierarchy(hierarchy: VisionHierarchy) -> Self {
        Self {
            hierarchy: RwLock::new(hierarchy),
            alignments: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace one objective node
    pub fn seed_objective(&self, objective: VisionObjective) {
        let mut hierarchy = self.hierarchy.write();
        hierarchy.insert(objective);
        if let Err(offending) = hierarchy.validate() {
            tracing::warn!(?offending, "vision hierarchy has structural violations");
        }
    }
}

#[async_trait]
impl VisionRepository for MemoryVisionStore {
    async fn get_hierarchy(&self) -> Result<VisionHierarchy> {
        Ok(self.hierarchy.read().clone())
    }

    async fn get_objective(&self, id: &str) -> Result<Option<VisionObjective>> {
        Ok(self.hierarchy.read().get(id).cloned())
    }

    async fn save_alignment(&self, task_id: &str, alignments: Vec<VisionAlignment>) -> Result<()> {
        self.alignments
            .lock()
            .insert(task_id.to_string(), alignments);
        Ok(())
    }

    async fn get_alignment(&self, task_id: &str) -> Result<Option<Vec<VisionAlignment>>> {
        Ok(self.alignments.lock().get(task_id).cloned())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory store for agents, assignments, handoffs, and conflicts
pub struct MemoryAgentStore {
    agents: Mutex<HashMap<String, Agent>>,
    assignments: Mutex<HashMap<String, Assignment>>,
    handoffs: Mutex<HashMap<String, Handoff>>,
    conflicts: Mutex<HashMap<String, AssignmentConflict>>,
    next_handoff: AtomicU64,
    next_conflict: AtomicU64,
}

impl Default for MemoryAgentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            assignments: Mutex::new(HashMap::new()),
            handoffs: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(HashMap::new()),
            next_handoff: AtomicU64::new(1),
            next_conflict: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl AgentRepository for MemoryAgentStore {
    async fn get(&self, id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.lock().get(id).cloned())
    }

    async fn save(&self, agent: Agent) -> Result<Agent> {
        self.agents.lock().insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn find_available(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .lock()
            .values()
            .filter(|a| a.status != orchestration_core::models::AgentAvailability::Offline)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn assignment_for(&self, task_id: &str) -> Result<Option<Assignment>> {
        Ok(self.assignments.lock().get(task_id).cloned())
    }

    async fn save_assignment(
        &self,
        assignment: Assignment,
        expected_current: Option<String>,
    ) -> Result<Assignment> {
        let mut assignments = self.assignments.lock();
        let current = assignments
            .get(&assignment.task_id)
            .map(|a| a.agent_id.clone());
        if current != expected_current {
            return Err(OrchestrationError::ConcurrentModification(format!(
                "assignment on task {}",
                assignment.task_id
            )));
        }
        assignments.insert(assignment.task_id.clone(), assignment.clone());
        Ok(assignment)
    }

    async fn remove_assignment(&self, task_id: &str) -> Result<()> {
        self.assignments.lock().remove(task_id);
        Ok(())
    }

    async fn assignments_for_agent(&self, agent_id: &str) -> Result<Vec<Assignment>> {
        let mut out: Vec<Assignment> = self
            .assignments
            .lock()
            .values()
            .filter(|a| a.agent_id == agent_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(out)
    }

    async fn save_handoff(&self, mut handoff: Handoff) -> Result<Handoff> {
        if handoff.id.is_empty() {
            handoff.id = format!(
                "handoff-{:04}",
                self.next_handoff.fetch_add(1, Ordering::SeqCst)
            );
        }
        self.handoffs
            .lock()
            .insert(handoff.id.clone(), handoff.clone());
        Ok(handoff)
    }

    async fn get_handoff(&self, id: &str) -> Result<Option<Handoff>> {
        Ok(self.handoffs.lock().get(id).cloned())
    }

    async fn open_handoffs_for_agent(&self, agent_id: &str) -> Result<Vec<Handoff>> {
        let mut out: Vec<Handoff> = self
            .handoffs
            .lock()
            .values()
            .filter(|h| {
                !h.state.is_terminal() && (h.from_agent == agent_id || h.to_agent == agent_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn save_conflict(&self, mut conflict: AssignmentConflict) -> Result<AssignmentConflict> {
        if conflict.id.is_empty() {
            conflict.id = format!(
                "conflict-{:04}",
                self.next_conflict.fetch_add(1, Ordering::SeqCst)
            );
        }
        self.conflicts
            .lock()
            .insert(conflict.id.clone(), conflict.clone());
        Ok(conflict)
    }

    async fn get_conflict(&self, id: &str) -> Result<Option<AssignmentConflict>> {
        Ok(self.conflicts.lock().get(id).cloned())
    }

    async fn open_conflicts_for(&self, task_id: &str) -> Result<Vec<AssignmentConflict>> {
        let mut out: Vec<AssignmentConflict> = self
            .conflicts
            .lock()
            .values()
            .filter(|c| c.task_id == task_id && c.is_open())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory hint store with feedback overwrite semantics
pub struct MemoryHintStore {
    hints: Mutex<HashMap<String, WorkflowHint>>,
    feedback: Mutex<HashMap<String, HintFeedback>>,
    next_id: AtomicU64,
}

impl Default for MemoryHintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHintStore {
    pub fn new() -> Self {
        Self {
            hints: Mutex::new(HashMap::new()),
            feedback: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Recorded feedback for a hint, if any
    pub fn feedback_for(&self, hint_id: &str) -> Option<HintFeedback> {
        self.feedback.lock().get(hint_id).cloned()
    }
}

#[async_trait]
impl HintRepository for MemoryHintStore {
    async fn save(&self, mut hint: WorkflowHint) -> Result<WorkflowHint> {
        if hint.id.is_empty() {
            hint.id = format!("hint-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        self.hints.lock().insert(hint.id.clone(), hint.clone());
        Ok(hint)
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowHint>> {
        Ok(self.hints.lock().get(id).cloned())
    }

    async fn mark_feedback(&self, feedback: HintFeedback) -> Result<()> {
        if !self.hints.lock().contains_key(&feedback.hint_id) {
            return Err(OrchestrationError::NotFound(format!(
                "hint {}",
                feedback.hint_id
            )));
        }
        self.feedback
            .lock()
            .insert(feedback.hint_id.clone(), feedback);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Bundle of all five stores plus a helper to wire them into the engine
pub struct MemoryStores {
    pub tasks: Arc<MemoryTaskStore>,
    pub contexts: Arc<MemoryContextStore>,
    pub vision: Arc<MemoryVisionStore>,
    pub agents: Arc<MemoryAgentStore>,
    pub hints: Arc<MemoryHintStore>,
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(MemoryTaskStore::new()),
            contexts: Arc::new(MemoryContextStore::new()),
            vision: Arc::new(MemoryVisionStore::new()),
            agents: Arc::new(MemoryAgentStore::new()),
            hints: Arc::new(MemoryHintStore::new()),
        }
    }

    /// Probe every store once; used by server startup validation
    pub async fn health_check(&self) -> Result<()> {
        self.tasks.health_check().await?;
        self.contexts.health_check().await?;
        self.vision.health_check().await?;
        self.agents.health_check().await?;
        self.hints.health_check().await
    }

    /// Engine dependency bundle over these stores
    pub fn deps(&self, config: EngineConfig) -> EngineDeps {
        EngineDeps {
            tasks: self.tasks.clone(),
            contexts: self.contexts.clone(),
            vision: self.vision.clone(),
            agents: self.agents.clone(),
            hints: self.hints.clone(),
            config,
        }
    }
}
