//! Canned scenario setups shared by integration and property tests.

use orchestration_core::models::{
    Agent, Task, TaskStatus, VisionHierarchy, VisionLevel,
};
use storage::MemoryStores;

use crate::builders::{AgentBuilder, ObjectiveBuilder, TaskBuilder};

/// A parent task plus children in the given `(id, status, progress)`
/// states; the parent's aggregate is left at the stated figure.
pub fn family(
    parent_id: &str,
    parent_overall: u8,
    children: &[(&str, TaskStatus, u8)],
) -> (Task, Vec<Task>) {
    let child_ids: Vec<&str> = children.iter().map(|(id, _, _)| *id).collect();
    let parent = TaskBuilder::new(parent_id)
        .title("Parent work item")
        .description("Umbrella for the child work items")
        .status(TaskStatus::InProgress)
        .progress(parent_overall)
        .subtasks(&child_ids)
        .build();

    let kids = children
        .iter()
        .map(|(id, status, progress)| {
            let mut builder = TaskBuilder::new(id)
                .parent(parent_id)
                .status(*status);
            if *status == TaskStatus::InProgress && *progress > 0 {
                builder = builder.reported(*progress);
            } else {
                builder = builder.progress(*progress);
            }
            builder.build()
        })
        .collect();

    (parent, kids)
}

/// Persist a task family into a store bundle
pub async fn seed_family(stores: &MemoryStores, parent: &Task, children: &[Task]) {
    use orchestration_core::repository::TaskRepository;
    stores.tasks.save(parent.clone()).await.expect("seed parent");
    for child in children {
        stores.tasks.save(child.clone()).await.expect("seed child");
    }
}

/// Identity-themed vision tree whose branch node aligns at ~0.81 with the
/// matching in-progress urgent task from [`aligned_task`]
pub fn identity_vision() -> VisionHierarchy {
    let mut hierarchy = VisionHierarchy::default();
    hierarchy.insert(
        ObjectiveBuilder::new("org-acme", VisionLevel::Organization)
            .title("Acme engineering")
            .build(),
    );
    hierarchy.insert(
        ObjectiveBuilder::new("proj-identity", VisionLevel::Project)
            .parent("org-acme")
            .title("Identity platform")
            .metric("adoption", 40.0, 100.0, "%")
            .build(),
    );
    hierarchy.insert(
        ObjectiveBuilder::new("branch-auth", VisionLevel::Branch)
            .parent("proj-identity")
            .title("Auth hardening")
            .build(),
    );
    hierarchy
}

/// The task [`identity_vision`] is tuned against
pub fn aligned_task(id: &str) -> Task {
    TaskBuilder::new(id)
        .title("Auth hardening")
        .description("Auth hardening rollout")
        .branch("branch-auth")
        .status(TaskStatus::InProgress)
        .priority(orchestration_core::models::Priority::Urgent)
        .build()
}

/// Three agents with distinct roles, expertise, and load
pub fn standard_agents() -> Vec<Agent> {
    vec![
        AgentBuilder::new("agent-backend")
            .role("developer")
            .expertise(&["rust", "async", "storage"])
            .load(0.3)
            .build(),
        AgentBuilder::new("agent-frontend")
            .role("developer")
            .expertise(&["typescript", "ui"])
            .load(0.6)
            .build(),
        AgentBuilder::new("agent-reviewer")
            .role("reviewer")
            .expertise(&["rust", "security"])
            .capabilities(&["developer"])
            .load(0.1)
            .build(),
    ]
}

/// Persist the standard agents
pub async fn seed_agents(stores: &MemoryStores) {
    use orchestration_core::repository::AgentRepository;
    for agent in standard_agents() {
        stores.agents.save(agent).await.expect("seed agent");
    }
}
