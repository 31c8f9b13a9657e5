//! Property tests for the universally quantified engine invariants.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;

use mocks::builders::{ContextBuilder, TaskBuilder};
use mocks::generators::{arb_children, arb_percentage};
use orchestration_core::{
    aggregation::ProgressAggregator,
    events::DomainEvent,
    guidance::{HintEngine, HintInputs, Phase},
    repository::{AgentRepository, ContextRepository, TaskRepository},
    EngineConfig, ErrorCode, HandoffState, TaskStatus, ToolDispatcher,
};
use storage::{MemoryStores, MemoryTaskStore};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn dispatcher_over(stores: &MemoryStores) -> ToolDispatcher {
    ToolDispatcher::new(stores.deps(EngineConfig::default()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// a done task always has a non-empty summary and only done children
    #[test]
    fn done_implies_summary_and_done_children(
        children in arb_children("P"),
        with_summary in any::<bool>(),
    ) {
        runtime().block_on(async move {
            let stores = MemoryStores::new();
            let child_ids: Vec<&str> =
                children.iter().map(|c| c.id.as_str()).collect();
            let parent = TaskBuilder::new("P")
                .status(TaskStatus::InProgress)
                .subtasks(&child_ids)
                .build();
            stores.tasks.save(parent).await.unwrap();
            for child in &children {
                stores.tasks.save(child.clone()).await.unwrap();
            }
            let dispatcher = dispatcher_over(&stores);

            let mut params = json!({ "action": "complete", "task_id": "P" });
            if with_summary {
                params["completion_summary"] = json!("all child work folded in");
            }
            let _ = dispatcher.dispatch("manage_task", params).await;

            // Whatever the attempt did, the invariant holds on the store
            let parent = stores.tasks.get("P").await.unwrap().unwrap();
            if parent.status == TaskStatus::Done {
                let context = stores.contexts.get_by_task("P").await.unwrap().unwrap();
                prop_assert!(context.has_completion_summary());
                for child in stores.tasks.find_children("P").await.unwrap() {
                    prop_assert_eq!(child.status, TaskStatus::Done);
                }
            }
            Ok(())
        })?;
    }

    /// identical inputs produce byte-identical guidance
    #[test]
    fn guidance_is_deterministic(
        progress in arb_percentage(),
        minutes_quiet in 0i64..120,
    ) {
        let now = Utc::now();
        let task = TaskBuilder::new("T")
            .status(TaskStatus::InProgress)
            .progress(progress)
            .build();
        let context = ContextBuilder::new("T")
            .last_updated(now - Duration::minutes(minutes_quiet))
            .build();
        let engine = HintEngine::new(Duration::minutes(30), 6);

        let inputs = || HintInputs {
            tool: "manage_task",
            task: Some(&task),
            context: Some(&context),
            children: &[],
            alignments: &[],
            open_conflicts: &[],
            error: None,
            now,
        };
        let a = serde_json::to_vec(&engine.guidance(&inputs())).unwrap();
        let b = serde_json::to_vec(&engine.guidance(&inputs())).unwrap();
        prop_assert_eq!(a, b);
    }

    /// a parent's overall progress equals the aggregate of its children
    /// after any single subtask completion
    #[test]
    fn parent_overall_matches_child_aggregate(children in arb_children("P")) {
        runtime().block_on(async move {
            let stores = MemoryStores::new();
            let child_ids: Vec<&str> =
                children.iter().map(|c| c.id.as_str()).collect();
            let parent = TaskBuilder::new("P")
                .status(TaskStatus::InProgress)
                .subtasks(&child_ids)
                .build();
            stores.tasks.save(parent).await.unwrap();
            for child in &children {
                stores.tasks.save(child.clone()).await.unwrap();
            }
            let dispatcher = dispatcher_over(&stores);

            // Complete the first completable child, if any
            if let Some(target) = children
                .iter()
                .find(|c| matches!(c.status, TaskStatus::InProgress | TaskStatus::Review))
            {
                let reply = dispatcher
                    .dispatch(
                        "complete_subtask_with_update",
                        json!({
                            "task_id": "P",
                            "subtask_id": target.id,
                            "completion_summary": "done in test",
                        }),
                    )
                    .await;
                prop_assert!(reply.success, "completion failed: {:?}", reply.error);

                let parent = stores.tasks.get("P").await.unwrap().unwrap();
                let current = stores.tasks.find_children("P").await.unwrap();
                prop_assert_eq!(
                    parent.overall_progress,
                    ProgressAggregator::parent_overall(&current)
                );
            }
            Ok(())
        })?;
    }

    /// milestone events fire exactly once per upward crossing
    #[test]
    fn milestones_fire_once_per_upward_crossing(
        sequence in prop::collection::vec(arb_percentage(), 1..20),
    ) {
        let now = Utc::now();
        let mut task = TaskBuilder::new("T").status(TaskStatus::InProgress).build();
        let thresholds: Vec<u8> = task.milestones.iter().map(|m| m.threshold).collect();

        let mut fired_counts = vec![0usize; thresholds.len()];
        let mut expected_counts = vec![0usize; thresholds.len()];
        let mut previous: u8 = 0;

        for pct in sequence {
            for (i, t) in thresholds.iter().enumerate() {
                if previous < *t && pct >= *t {
                    expected_counts[i] += 1;
                }
            }
            task.overall_progress = pct;
            for event in ProgressAggregator::update_milestones(&mut task, previous, now) {
                if let DomainEvent::ProgressMilestoneReached { threshold, .. } = event {
                    let i = thresholds.iter().position(|t| *t == threshold).unwrap();
                    fired_counts[i] += 1;
                }
            }
            previous = pct;
        }

        prop_assert_eq!(fired_counts, expected_counts);
    }
}

/// every dispatcher reply carries guidance with a known phase
#[tokio::test]
async fn guidance_always_present_with_known_phase() {
    let stores = MemoryStores::new();
    stores
        .tasks
        .save(TaskBuilder::new("T").status(TaskStatus::InProgress).build())
        .await
        .unwrap();
    let dispatcher = dispatcher_over(&stores);

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("manage_task", json!({ "action": "get", "task_id": "T" })),
        ("manage_task", json!({ "action": "list" })),
        ("manage_task", json!({ "bad": "shape" })),
        ("no_such_tool", json!({})),
        ("report_progress", json!({ "task_id": "missing" })),
        ("get_vision_alignment", json!({ "task_id": "T" })),
    ];
    for (tool, params) in calls {
        let reply = dispatcher.dispatch(tool, params).await;
        assert!(
            Phase::ALL.contains(&reply.workflow_guidance.current_state.phase),
            "unknown phase from {tool}"
        );
    }
}

/// handoff transitions outside the graph fail without mutating state
#[tokio::test]
async fn invalid_handoff_transitions_rejected() {
    let stores = MemoryStores::new();
    mocks::fixtures::seed_agents(&stores).await;
    stores
        .tasks
        .save(
            TaskBuilder::new("T")
                .status(TaskStatus::InProgress)
                .assignee("agent-backend")
                .build(),
        )
        .await
        .unwrap();
    let dispatcher = dispatcher_over(&stores);

    let reply = dispatcher
        .dispatch(
            "request_work_handoff",
            json!({
                "from_agent_id": "agent-backend",
                "to_agent_id": "agent-frontend",
                "task_id": "T",
                "work_summary": "handing over",
            }),
        )
        .await;
    let handoff_id = reply.data.unwrap()["handoff"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // requested -> completed is not in the graph
    let reply = dispatcher
        .dispatch("complete_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(!reply.success);
    assert_eq!(
        reply.error.as_ref().unwrap().code,
        ErrorCode::InvalidHandoffState
    );
    let handoff = stores
        .agents
        .get_handoff(&handoff_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handoff.state, HandoffState::Requested);

    // accept, then a second accept must fail
    let reply = dispatcher
        .dispatch("accept_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(reply.success);
    let reply = dispatcher
        .dispatch("accept_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(!reply.success);
    assert_eq!(
        reply.error.as_ref().unwrap().code,
        ErrorCode::InvalidHandoffState
    );

    // rejecting an accepted handoff is also outside the graph
    let reply = dispatcher
        .dispatch("reject_handoff", json!({ "handoff_id": handoff_id }))
        .await;
    assert!(!reply.success);
    let handoff = stores
        .agents
        .get_handoff(&handoff_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handoff.state, HandoffState::Accepted);
}

/// of two writers racing on one task version, exactly one commits
#[tokio::test]
async fn concurrent_writers_exactly_one_commits() {
    let store = MemoryTaskStore::new();
    let task = store
        .save(TaskBuilder::new("T").status(TaskStatus::InProgress).build())
        .await
        .unwrap();

    let mut first = task.clone();
    first.title = "writer one".to_string();
    let mut second = task.clone();
    second.title = "writer two".to_string();

    let (a, b) = tokio::join!(
        store.update_with_version(first, task.version),
        store.update_with_version(second, task.version),
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(loser.unwrap_err().is_concurrent_modification());
}
