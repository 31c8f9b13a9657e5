//! Proptest strategies for the domain types.

use proptest::prelude::*;

use orchestration_core::models::{Priority, ProgressType, Task, TaskStatus};

use crate::builders::TaskBuilder;

pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Review),
        Just(TaskStatus::Done),
        Just(TaskStatus::Cancelled),
    ]
}

pub fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
        Just(Priority::Critical),
    ]
}

pub fn arb_progress_type() -> impl Strategy<Value = ProgressType> {
    prop_oneof![
        Just(ProgressType::Analysis),
        Just(ProgressType::Design),
        Just(ProgressType::Implementation),
        Just(ProgressType::Testing),
        Just(ProgressType::Documentation),
        Just(ProgressType::Review),
        Just(ProgressType::Deployment),
        Just(ProgressType::General),
    ]
}

pub fn arb_percentage() -> impl Strategy<Value = u8> {
    0..=100u8
}

/// A child-shaped task in an arbitrary status with a consistent progress
/// figure for that status
pub fn arb_child(parent_id: String, index: usize) -> impl Strategy<Value = Task> {
    (arb_task_status(), arb_percentage(), any::<bool>()).prop_map(
        move |(status, percentage, reported)| {
            let id = format!("{parent_id}-c{index}");
            let mut builder = TaskBuilder::new(&id).parent(&parent_id).status(status);
            builder = match status {
                TaskStatus::Done => builder,
                TaskStatus::InProgress if reported => builder.reported(percentage),
                _ => builder.progress(percentage),
            };
            builder.build()
        },
    )
}

/// A small family of children under one parent id
pub fn arb_children(parent_id: &str) -> impl Strategy<Value = Vec<Task>> {
    let parent_id = parent_id.to_string();
    prop::collection::vec(1usize..=1, 1..=6).prop_flat_map(move |slots| {
        let parent_id = parent_id.clone();
        slots
            .into_iter()
            .enumerate()
            .map(|(i, _)| arb_child(parent_id.clone(), i))
            .collect::<Vec<_>>()
    })
}
