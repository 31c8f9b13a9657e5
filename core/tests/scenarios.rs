//! End-to-end scenarios through the dispatcher against in-memory stores.

use chrono::{Duration, Utc};
use serde_json::json;

use mocks::builders::ContextBuilder;
use mocks::fixtures;
use orchestration_core::{
    repository::{AgentRepository, ContextRepository, TaskRepository},
    EngineConfig, ErrorCode, HandoffState, TaskStatus, ToolDispatcher,
};
use storage::MemoryStores;

fn dispatcher_over(stores: &MemoryStores) -> ToolDispatcher {
    ToolDispatcher::new(stores.deps(EngineConfig::default()))
}

/// completion without a summary is blocked with a ready-to-paste fix
#[tokio::test]
async fn completion_blocked_by_missing_summary() {
    let stores = MemoryStores::new();
    let task = mocks::TaskBuilder::new("T1")
        .status(TaskStatus::InProgress)
        .build();
    stores.tasks.save(task).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "complete", "task_id": "T1" }))
        .await;

    assert!(!reply.success);
    assert_eq!(
        reply.error.as_ref().unwrap().code,
        ErrorCode::MissingCompletionSummary
    );
    let first = &reply.workflow_guidance.next_actions[0];
    assert_eq!(first.tool, "manage_task");
    assert!(first.params.get("completion_summary").is_some());

    // Nothing was committed
    let stored = stores.tasks.get("T1").await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::InProgress);
}

/// completing a subtask recomputes the parent and leaves an auto-note
#[tokio::test]
async fn subtask_completion_propagates() {
    let stores = MemoryStores::new();
    let (parent, children) = fixtures::family(
        "P",
        50,
        &[
            ("C1", TaskStatus::Done, 100),
            ("C2", TaskStatus::InProgress, 50),
            ("C3", TaskStatus::Todo, 0),
        ],
    );
    fixtures::seed_family(&stores, &parent, &children).await;
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "complete_subtask_with_update",
            json!({ "task_id": "P", "subtask_id": "C2", "completion_summary": "x" }),
        )
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    let data = reply.data.unwrap();
    assert_eq!(data["subtask"]["status"], "done");
    // round((100 + 100 + 0) / 3) = 67
    assert_eq!(data["parent"]["overall_progress"], 67);

    let parent_context = stores.contexts.get_by_task("P").await.unwrap().unwrap();
    assert!(parent_context
        .progress_notes
        .iter()
        .any(|n| n.text.contains("C2")));
}

/// open subtasks block parent completion and the fix names them
#[tokio::test]
async fn completion_blocked_by_open_subtasks() {
    let stores = MemoryStores::new();
    let (parent, children) = fixtures::family(
        "P",
        50,
        &[("C1", TaskStatus::Done, 100), ("C2", TaskStatus::Todo, 0)],
    );
    fixtures::seed_family(&stores, &parent, &children).await;
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "manage_task",
            json!({ "action": "complete", "task_id": "P", "completion_summary": "done" }),
        )
        .await;

    assert!(!reply.success);
    let error = reply.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::IncompleteSubtasks);
    assert!(error.message.contains("C2"));
    assert!(!error.message.contains("C1"));

    let first = &reply.workflow_guidance.next_actions[0];
    assert_eq!(first.tool, "complete_subtask_with_update");
    assert_eq!(first.params["subtask_id"], "C2");

    let stored = stores.tasks.get("P").await.unwrap().unwrap();
    assert_ne!(stored.status, TaskStatus::Done);
}

/// task reads carry vision enrichment with the expected top alignment
#[tokio::test]
async fn vision_enrichment_present_on_get() {
    let stores = MemoryStores::new();
    for objective in fixtures::identity_vision().objectives.into_values() {
        stores.vision.seed_objective(objective);
    }
    stores
        .tasks
        .save(fixtures::aligned_task("T"))
        .await
        .unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "get", "task_id": "T" }))
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    let data = reply.data.unwrap();
    let alignments = data["vision_context"]["alignments"].as_array().unwrap();
    assert_eq!(alignments[0]["objective_id"], "branch-auth");
    let score = alignments[0]["score"].as_f64().unwrap();
    assert!(
        (score - 0.82).abs() <= 0.02,
        "top alignment score {score} not within 0.02 of 0.82"
    );
    let confidence = alignments[0]["confidence"].as_f64().unwrap();
    assert!(confidence >= 0.8);
}

/// handoff happy path transfers ownership and records the summary
#[tokio::test]
async fn handoff_happy_path() {
    let stores = MemoryStores::new();
    fixtures::seed_agents(&stores).await;
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .assignee("agent-backend")
        .build();
    stores.tasks.save(task).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "request_work_handoff",
            json!({
                "from_agent_id": "agent-backend",
                "to_agent_id": "agent-reviewer",
                "task_id": "T",
                "work_summary": "parser built, tests green, docs missing",
            }),
        )
        .await;
    assert!(reply.success, "request failed: {:?}", reply.error);
    let handoff_id = reply.data.unwrap()["handoff"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let reply = dispatcher
        .dispatch("accept_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(reply.success, "accept failed: {:?}", reply.error);
    let task = stores.tasks.get("T").await.unwrap().unwrap();
    assert_eq!(task.assignee.as_deref(), Some("agent-reviewer"));
    let assignment = stores.agents.assignment_for("T").await.unwrap().unwrap();
    assert_eq!(assignment.agent_id, "agent-reviewer");

    let reply = dispatcher
        .dispatch("complete_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(reply.success, "complete failed: {:?}", reply.error);
    let handoff = stores.agents.get_handoff(&handoff_id).await.unwrap().unwrap();
    assert_eq!(handoff.state, HandoffState::Completed);

    let context = stores.contexts.get_by_task("T").await.unwrap().unwrap();
    assert!(context
        .progress_notes
        .iter()
        .any(|n| n.text.contains("parser built, tests green, docs missing")));
}

/// a quiet in-progress task draws a staleness warning on read
#[tokio::test]
async fn staleness_warning_on_read() {
    let stores = MemoryStores::new();
    let now = Utc::now();
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .build();
    stores.tasks.save(task).await.unwrap();
    stores
        .contexts
        .save(
            ContextBuilder::new("T")
                .last_updated(now - Duration::minutes(45))
                .build(),
        )
        .await
        .unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "get", "task_id": "T" }))
        .await;

    assert!(reply.success);
    assert!(reply
        .workflow_guidance
        .warnings
        .iter()
        .any(|w| w.contains("stale")));
    assert_eq!(
        reply.workflow_guidance.next_actions[0].tool,
        "quick_task_update"
    );
}

/// Unknown tools come back in the uniform envelope, guidance included
#[tokio::test]
async fn unknown_tool_uniform_envelope() {
    let stores = MemoryStores::new();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher.dispatch("manage_everything", json!({})).await;

    assert!(!reply.success);
    assert_eq!(reply.error.as_ref().unwrap().code, ErrorCode::UnknownTool);
    assert!(!reply.workflow_guidance.next_actions.is_empty());
}

/// Parameter shape mismatches name the offending field
#[tokio::test]
async fn invalid_parameters_name_the_field() {
    let stores = MemoryStores::new();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "report_progress",
            json!({ "task_id": "T", "description": "work" }),
        )
        .await;

    assert!(!reply.success);
    let error = reply.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::InvalidParameters);
    assert!(error.message.contains("progress_type"));
}

/// quick_task_update is report_progress(general) plus a context note
#[tokio::test]
async fn quick_update_records_progress_and_note() {
    let stores = MemoryStores::new();
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .build();
    stores.tasks.save(task).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "quick_task_update",
            json!({
                "task_id": "T",
                "what_i_did": "wired the tokenizer",
                "progress_percentage": 40,
            }),
        )
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    let task = stores.tasks.get("T").await.unwrap().unwrap();
    assert_eq!(task.overall_progress, 40);
    assert_eq!(task.timeline.snapshots.len(), 1);

    let context = stores.contexts.get_by_task("T").await.unwrap().unwrap();
    assert!(context
        .progress_notes
        .iter()
        .any(|n| n.text.contains("wired the tokenizer")));
}

/// Deleting a parent cascades to the whole subtree
#[tokio::test]
async fn delete_cascades_to_subtasks() {
    let stores = MemoryStores::new();
    let (parent, children) = fixtures::family(
        "P",
        0,
        &[("C1", TaskStatus::Todo, 0), ("C2", TaskStatus::Todo, 0)],
    );
    fixtures::seed_family(&stores, &parent, &children).await;
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "delete", "task_id": "P" }))
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    assert!(stores.tasks.get("P").await.unwrap().is_none());
    assert!(stores.tasks.get("C1").await.unwrap().is_none());
    assert!(stores.tasks.get("C2").await.unwrap().is_none());
}

/// Subtask added after the parent hit 100% drops the aggregate; milestones
/// stay fired
#[tokio::test]
async fn late_subtask_drops_parent_aggregate() {
    let stores = MemoryStores::new();
    let parent = mocks::TaskBuilder::new("P")
        .status(TaskStatus::InProgress)
        .reported(100)
        .build();
    stores.tasks.save(parent).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "manage_subtask",
            json!({
                "action": "create",
                "task_id": "P",
                "title": "Late extra work",
                "description": "Discovered after the fact",
            }),
        )
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    let parent = stores.tasks.get("P").await.unwrap().unwrap();
    // One todo child: aggregate is 0
    assert_eq!(parent.overall_progress, 0);
}

/// get_workflow_hints persists the hints it returns; feedback lands
#[tokio::test]
async fn hints_roundtrip_with_feedback() {
    let stores = MemoryStores::new();
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .build();
    stores.tasks.save(task).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch("get_workflow_hints", json!({ "task_id": "T" }))
        .await;
    assert!(reply.success);
    let data = reply.data.unwrap();
    let hints = data["hints"].as_array().unwrap();
    assert!(!hints.is_empty());
    let hint_id = hints[0]["id"].as_str().unwrap().to_string();

    let reply = dispatcher
        .dispatch(
            "provide_hint_feedback",
            json!({ "hint_id": hint_id, "task_id": "T", "was_helpful": true }),
        )
        .await;
    assert!(reply.success);
    let feedback = stores.hints.feedback_for(&hint_id).unwrap();
    assert!(feedback.was_helpful);
}

/// A committed subtask mutation is never reported as failed just because
/// the parent recompute keeps losing its optimistic race
#[tokio::test]
async fn committed_child_survives_contended_parent() {
    use async_trait::async_trait;
    use orchestration_core::{
        models::{NewTask, Task, TaskFilter},
        usecases::EngineDeps,
        OrchestrationError,
    };
    use std::sync::Arc;
    use storage::MemoryTaskStore;

    /// Delegates to the in-memory store but loses every versioned write
    /// on one task id, as if a sibling kept committing first
    struct ContendedParentStore {
        inner: Arc<MemoryTaskStore>,
        contended: String,
    }

    #[async_trait]
    impl TaskRepository for ContendedParentStore {
        async fn create(&self, task: NewTask) -> orchestration_core::Result<Task> {
            self.inner.create(task).await
        }

        async fn get(&self, id: &str) -> orchestration_core::Result<Option<Task>> {
            self.inner.get(id).await
        }

        async fn save(&self, task: Task) -> orchestration_core::Result<Task> {
            self.inner.save(task).await
        }

        async fn update_with_version(
            &self,
            task: Task,
            expected_version: u64,
        ) -> orchestration_core::Result<Task> {
            if task.id == self.contended {
                return Err(OrchestrationError::ConcurrentModification(format!(
                    "task {}",
                    task.id
                )));
            }
            self.inner.update_with_version(task, expected_version).await
        }

        async fn find_by_branch(
            &self,
            branch_id: &str,
            filter: TaskFilter,
        ) -> orchestration_core::Result<Vec<Task>> {
            self.inner.find_by_branch(branch_id, filter).await
        }

        async fn find_children(&self, parent_id: &str) -> orchestration_core::Result<Vec<Task>> {
            self.inner.find_children(parent_id).await
        }

        async fn list(&self, filter: TaskFilter) -> orchestration_core::Result<Vec<Task>> {
            self.inner.list(filter).await
        }

        async fn delete(&self, id: &str) -> orchestration_core::Result<()> {
            self.inner.delete(id).await
        }

        async fn health_check(&self) -> orchestration_core::Result<()> {
            self.inner.health_check().await
        }
    }

    let stores = MemoryStores::new();
    let (parent, children) = fixtures::family(
        "P",
        50,
        &[
            ("C1", TaskStatus::Done, 100),
            ("C2", TaskStatus::InProgress, 50),
        ],
    );
    fixtures::seed_family(&stores, &parent, &children).await;

    let dispatcher = ToolDispatcher::new(EngineDeps {
        tasks: Arc::new(ContendedParentStore {
            inner: stores.tasks.clone(),
            contended: "P".to_string(),
        }),
        contexts: stores.contexts.clone(),
        vision: stores.vision.clone(),
        agents: stores.agents.clone(),
        hints: stores.hints.clone(),
        config: EngineConfig::default(),
    });

    let reply = dispatcher
        .dispatch(
            "complete_subtask_with_update",
            json!({ "task_id": "P", "subtask_id": "C2", "completion_summary": "x" }),
        )
        .await;

    // The child's commit stands and the reply says so; the parent keeps
    // its stale aggregate until the next recompute wins
    assert!(reply.success, "reply failed: {:?}", reply.error);
    let child = stores.tasks.get("C2").await.unwrap().unwrap();
    assert_eq!(child.status, TaskStatus::Done);
    let child_context = stores.contexts.get_by_task("C2").await.unwrap().unwrap();
    assert!(child_context.has_completion_summary());
    let parent = stores.tasks.get("P").await.unwrap().unwrap();
    assert_eq!(parent.overall_progress, 50);
}

/// Conflicting assignment writes surface a conflict; merge resolution
/// unions the responsibilities and closes it
#[tokio::test]
async fn assignment_conflict_merge_resolution() {
    use orchestration_core::models::{Assignment, AssignmentConflict};

    let stores = MemoryStores::new();
    fixtures::seed_agents(&stores).await;
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .assignee("agent-backend")
        .build();
    stores.tasks.save(task).await.unwrap();

    let now = Utc::now();
    let assignment = |agent: &str, duty: &str| Assignment {
        task_id: "T".to_string(),
        agent_id: agent.to_string(),
        role: "developer".to_string(),
        responsibilities: vec![duty.to_string()],
        assigned_at: now,
        assigned_by: None,
    };
    stores
        .agents
        .save_assignment(assignment("agent-backend", "build"), None)
        .await
        .unwrap();
    let conflict = stores
        .agents
        .save_conflict(AssignmentConflict {
            id: String::new(),
            task_id: "T".to_string(),
            incumbent: assignment("agent-backend", "build"),
            challenger: assignment("agent-frontend", "polish"),
            detected_at: now,
            strategy: None,
            resolved_by: None,
            resolved_at: None,
            details: None,
        })
        .await
        .unwrap();

    // Until resolved, guidance flags the conflict
    let dispatcher = dispatcher_over(&stores);
    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "get", "task_id": "T" }))
        .await;
    assert!(reply
        .workflow_guidance
        .warnings
        .iter()
        .any(|w| w.contains(&conflict.id)));

    let reply = dispatcher
        .dispatch(
            "resolve_conflict",
            json!({
                "conflict_id": conflict.id,
                "strategy": "merge",
                "resolved_by": "agent-reviewer",
                "details": "both sets of duties apply",
            }),
        )
        .await;
    assert!(reply.success, "resolve failed: {:?}", reply.error);

    let resolved = stores
        .agents
        .get_conflict(&conflict.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!resolved.is_open());

    let merged = stores.agents.assignment_for("T").await.unwrap().unwrap();
    assert_eq!(merged.agent_id, "agent-backend");
    assert!(merged.responsibilities.contains(&"build".to_string()));
    assert!(merged.responsibilities.contains(&"polish".to_string()));
}

/// Auto-assignment picks the most suitable available agent
#[tokio::test]
async fn auto_assignment_picks_best_agent() {
    let stores = MemoryStores::new();
    fixtures::seed_agents(&stores).await;
    let task = mocks::TaskBuilder::new("T")
        .status(TaskStatus::InProgress)
        .labels(&["rust"])
        .build();
    stores.tasks.save(task).await.unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "assign_agent_to_task",
            json!({ "task_id": "T", "agent_id": "auto", "role": "reviewer" }),
        )
        .await;

    assert!(reply.success, "reply failed: {:?}", reply.error);
    // agent-reviewer: 0.4*0.9 + 0.4*1.0 + 0.2*1.0 = 0.96, ahead of both
    // developers on role and load
    let task = stores.tasks.get("T").await.unwrap().unwrap();
    assert_eq!(task.assignee.as_deref(), Some("agent-reviewer"));
}
