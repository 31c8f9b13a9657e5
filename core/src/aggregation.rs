//! Progress recording, overall-progress computation, milestone firing, and
//! upward propagation from subtasks to their parents.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    events::{DomainEvent, EventHandler},
    models::{
        ProgressNote, ProgressSnapshot, ProgressTimeline, ProgressType, Task, TaskContext,
        TaskStatus,
    },
    repository::{ContextRepository, TaskRepository},
};

/// Pure progress arithmetic shared by the progress and subtask use-cases
/// and the propagation handler.
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Record a snapshot on a leaf task and refresh its overall progress.
    ///
    /// A `general` snapshot sets overall directly (it may go down); any
    /// other type folds into the weighted per-type mean. Milestone events
    /// for crossings are returned.
    pub fn record(
        task: &mut Task,
        snapshot: ProgressSnapshot,
        weights: Option<&HashMap<ProgressType, f64>>,
        now: DateTime<Utc>,
    ) -> Vec<DomainEvent> {
        let previous = task.overall_progress;
        let is_general = snapshot.progress_type == ProgressType::General;
        let general_pct = snapshot.percentage;
        task.timeline.push(snapshot);

        if is_general {
            if let Some(pct) = general_pct {
                task.overall_progress = pct.min(100);
            }
        } else if task.subtask_ids.is_empty() {
            if let Some(overall) = Self::leaf_overall(&task.timeline, weights) {
                task.overall_progress = overall;
            }
        }
        // Parents keep their aggregate until the next subtask change unless
        // a general figure overrode it above.

        Self::update_milestones(task, previous, now)
    }

    /// Overall progress of a leaf task from its timeline: the latest
    /// `general` figure when one exists, otherwise the weighted mean of the
    /// latest percentage per reported type. Equal weights by default.
    pub fn leaf_overall(
        timeline: &ProgressTimeline,
        weights: Option<&HashMap<ProgressType, f64>>,
    ) -> Option<u8> {
        if let Some(general) = timeline.latest_percentage_of(ProgressType::General) {
            return Some(general.min(100));
        }

        let reported: Vec<(ProgressType, u8)> = timeline
            .reported_types()
            .into_iter()
            .filter(|t| *t != ProgressType::General)
            .filter_map(|t| timeline.latest_percentage_of(t).map(|p| (t, p)))
            .collect();
        if reported.is_empty() {
            return None;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (progress_type, pct) in &reported {
            let w = weights
                .and_then(|m| m.get(progress_type).copied())
                .unwrap_or(1.0)
                .max(0.0);
            weighted_sum += w * *pct as f64;
            weight_total += w;
        }
        if weight_total == 0.0 {
            return None;
        }
        Some(round_half_even(weighted_sum / weight_total).clamp(0, 100))
    }

    /// Overall progress of a parent from its children: done counts 100,
    /// in-progress with no reported figure counts 50, everything else
    /// contributes its own overall. Equal weighting, half-to-even rounding.
    pub fn parent_overall(children: &[Task]) -> u8 {
        if children.is_empty() {
            return 0;
        }
        let sum: f64 = children.iter().map(Self::child_contribution).sum();
        round_half_even(sum / children.len() as f64).clamp(0, 100)
    }

    fn child_contribution(child: &Task) -> f64 {
        match child.status {
            TaskStatus::Done => 100.0,
            TaskStatus::InProgress if !child.has_reported_progress() => 50.0,
            _ => child.overall_progress as f64,
        }
    }

    /// Fire milestones crossed from below and re-arm milestones the task
    /// dropped back under. Firing is idempotent per crossing: a fired
    /// milestone stays silent until progress dips below its threshold
    /// again; the re-arm itself emits nothing.
    pub fn update_milestones(
        task: &mut Task,
        previous: u8,
        now: DateTime<Utc>,
    ) -> Vec<DomainEvent> {
        let current = task.overall_progress;
        let task_id = task.id.clone();
        let mut fired = Vec::new();

        for milestone in &mut task.milestones {
            let t = milestone.threshold;
            if previous < t && current >= t && milestone.fired_at.is_none() {
                milestone.fired_at = Some(now);
                fired.push(DomainEvent::ProgressMilestoneReached {
                    task_id: task_id.clone(),
                    milestone: milestone.name.clone(),
                    threshold: t,
                });
            } else if current < t && milestone.fired_at.is_some() {
                milestone.fired_at = None;
            }
        }
        fired
    }

    /// Context note text written to a parent when a subtask's progress
    /// flows upward. This is the only implicit write to a parent's context.
    pub fn propagation_note(subtask_id: &str, progress: u8, detail: &str) -> String {
        format!("Subtask {subtask_id}: {progress}% - {detail}")
    }
}

/// Applies subtask changes to the parent aggregate.
///
/// Handles `SubtaskProgressAggregated` (recompute + context note) and
/// `SubtaskSetChanged` (recompute only). This handler performs the only
/// implicit write to a parent's context; milestone crossings on the parent
/// are returned as reaction events.
pub struct ProgressPropagationHandler {
    tasks: Arc<dyn TaskRepository>,
    contexts: Arc<dyn ContextRepository>,
    retry_attempts: u8,
}

impl ProgressPropagationHandler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        contexts: Arc<dyn ContextRepository>,
        retry_attempts: u8,
    ) -> Self {
        Self {
            tasks,
            contexts,
            retry_attempts,
        }
    }

    /// Recompute the parent's overall progress from its children under the
    /// parent's optimistic lock. A parent deleted mid-flight is not an
    /// error; the propagation just has nowhere to land.
    ///
    /// The recompute is pure derived state: every attempt re-reads the
    /// committed children. Running out of retries therefore means a
    /// concurrent writer keeps recomputing the same parent, and it is
    /// safe to yield the aggregate to that winner rather than fail the
    /// child's already-committed mutation.
    async fn recompute_parent(
        &self,
        parent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        let mut attempt: u8 = 0;
        loop {
            let Some(mut parent) = self.tasks.get(parent_id).await? else {
                return Ok(vec![]);
            };
            let expected = parent.version;
            let children = self.tasks.find_children(parent_id).await?;

            let previous = parent.overall_progress;
            parent.overall_progress = ProgressAggregator::parent_overall(&children);
            let fired = ProgressAggregator::update_milestones(&mut parent, previous, now);
            parent.touch(now);

            match self.tasks.update_with_version(parent, expected).await {
                Ok(_) => return Ok(fired),
                Err(e) if e.is_concurrent_modification() => {
                    if attempt < self.retry_attempts {
                        attempt += 1;
                        tokio::time::sleep(std::time::Duration::from_millis(
                            10 * attempt as u64,
                        ))
                        .await;
                    } else {
                        tracing::warn!(
                            parent_id,
                            "parent recompute lost its race; leaving the aggregate to the winning writer"
                        );
                        return Ok(vec![]);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl EventHandler for ProgressPropagationHandler {
    fn name(&self) -> &'static str {
        "progress-propagation"
    }

    fn interested_in(&self, event: &DomainEvent) -> bool {
        matches!(
            event,
            DomainEvent::SubtaskProgressAggregated { .. } | DomainEvent::SubtaskSetChanged { .. }
        )
    }

    async fn handle(&self, event: &DomainEvent, now: DateTime<Utc>) -> Result<Vec<DomainEvent>> {
        match event {
            DomainEvent::SubtaskProgressAggregated {
                parent_id,
                subtask_progress,
                note,
                ..
            } => {
                let fired = self.recompute_parent(parent_id, now).await?;
                if self.tasks.get(parent_id).await?.is_some() {
                    let mut context = self
                        .contexts
                        .get_by_task(parent_id)
                        .await?
                        .unwrap_or_else(|| TaskContext::new(parent_id.clone(), now));
                    context.push_note(ProgressNote {
                        timestamp: now,
                        agent_id: None,
                        text: note.clone(),
                        progress_type: ProgressType::General,
                        percentage: Some(*subtask_progress),
                    });
                    self.contexts.save(context).await?;
                }
                Ok(fired)
            }
            DomainEvent::SubtaskSetChanged { parent_id, .. } => {
                self.recompute_parent(parent_id, now).await
            }
            _ => Ok(vec![]),
        }
    }
}

/// Round to the nearest integer, ties to even (banker's rounding)
fn round_half_even(value: f64) -> u8 {
    let floor = value.floor();
    let frac = value - floor;
    let rounded = if (frac - 0.5).abs() < 1e-9 {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        value.round()
    };
    rounded.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotMetadata;

    fn snapshot(progress_type: ProgressType, percentage: Option<u8>) -> ProgressSnapshot {
        ProgressSnapshot {
            id: "t-ps-0001".to_string(),
            task_id: "t".to_string(),
            progress_type,
            percentage,
            description: "work".to_string(),
            metadata: SnapshotMetadata::default(),
            timestamp: Utc::now(),
            agent_id: None,
        }
    }

    fn child(id: &str, status: TaskStatus, overall: u8, reported: bool) -> Task {
        let mut t = Task::seed(id, id, id, "branch-1", Utc::now());
        t.status = status;
        t.overall_progress = overall;
        if reported {
            t.timeline.push(snapshot(ProgressType::General, Some(overall)));
        }
        t
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(66.666_666), 67);
        assert_eq!(round_half_even(0.5), 0);
        assert_eq!(round_half_even(1.5), 2);
        assert_eq!(round_half_even(2.5), 2);
        assert_eq!(round_half_even(3.5), 4);
        assert_eq!(round_half_even(50.0), 50);
    }

    #[test]
    fn test_leaf_overall_prefers_general() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Implementation, Some(80)));
        timeline.push(snapshot(ProgressType::General, Some(40)));
        assert_eq!(ProgressAggregator::leaf_overall(&timeline, None), Some(40));
    }

    #[test]
    fn test_leaf_overall_equal_weighted_mean() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Implementation, Some(80)));
        timeline.push(snapshot(ProgressType::Testing, Some(20)));
        assert_eq!(ProgressAggregator::leaf_overall(&timeline, None), Some(50));
    }

    #[test]
    fn test_leaf_overall_caller_weights() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Implementation, Some(100)));
        timeline.push(snapshot(ProgressType::Testing, Some(0)));

        let mut weights = HashMap::new();
        weights.insert(ProgressType::Implementation, 3.0);
        weights.insert(ProgressType::Testing, 1.0);
        assert_eq!(
            ProgressAggregator::leaf_overall(&timeline, Some(&weights)),
            Some(75)
        );
    }

    #[test]
    fn test_parent_overall_formula() {
        // done=100, in_progress with a reported 50, todo=0 -> 50
        let children = vec![
            child("C1", TaskStatus::Done, 100, false),
            child("C2", TaskStatus::InProgress, 50, true),
            child("C3", TaskStatus::Todo, 0, false),
        ];
        assert_eq!(ProgressAggregator::parent_overall(&children), 50);

        // completing C2 -> round((100+100+0)/3) = 67
        let children = vec![
            child("C1", TaskStatus::Done, 100, false),
            child("C2", TaskStatus::Done, 100, true),
            child("C3", TaskStatus::Todo, 0, false),
        ];
        assert_eq!(ProgressAggregator::parent_overall(&children), 67);
    }

    #[test]
    fn test_in_progress_without_figure_counts_half() {
        let children = vec![child("C1", TaskStatus::InProgress, 0, false)];
        assert_eq!(ProgressAggregator::parent_overall(&children), 50);
    }

    #[test]
    fn test_milestones_fire_once_per_crossing() {
        let now = Utc::now();
        let mut task = Task::seed("task-1", "T", "t", "branch-1", now);

        task.overall_progress = 60;
        let fired = ProgressAggregator::update_milestones(&mut task, 0, now);
        let names: Vec<&str> = fired
            .iter()
            .map(|e| match e {
                DomainEvent::ProgressMilestoneReached { milestone, .. } => milestone.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["quarter", "halfway"]);

        // Same figure again: nothing new fires
        let fired = ProgressAggregator::update_milestones(&mut task, 60, now);
        assert!(fired.is_empty());

        // Dropping below 50 re-arms halfway silently
        task.overall_progress = 30;
        let fired = ProgressAggregator::update_milestones(&mut task, 60, now);
        assert!(fired.is_empty());

        // Crossing again fires again
        task.overall_progress = 55;
        let fired = ProgressAggregator::update_milestones(&mut task, 30, now);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_record_general_overrides_aggregate() {
        let now = Utc::now();
        let mut parent = Task::seed("P", "Parent", "p", "branch-1", now);
        parent.subtask_ids = vec!["C1".to_string()];
        parent.overall_progress = 40;

        let events = ProgressAggregator::record(
            &mut parent,
            snapshot(ProgressType::General, Some(90)),
            None,
            now,
        );
        assert_eq!(parent.overall_progress, 90);
        // halfway and three-quarters crossed from 40
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_record_non_general_on_parent_keeps_aggregate() {
        let now = Utc::now();
        let mut parent = Task::seed("P", "Parent", "p", "branch-1", now);
        parent.subtask_ids = vec!["C1".to_string()];
        parent.overall_progress = 40;

        ProgressAggregator::record(
            &mut parent,
            snapshot(ProgressType::Design, Some(100)),
            None,
            now,
        );
        assert_eq!(parent.overall_progress, 40);
    }

    #[test]
    fn test_propagation_note_mentions_subtask() {
        let note = ProgressAggregator::propagation_note("C2", 100, "x");
        assert!(note.contains("C2"));
        assert!(note.contains("100%"));
    }

    /// Every write on the parent loses its version check
    struct ContendedTasks {
        parent: Task,
    }

    #[async_trait]
    impl TaskRepository for ContendedTasks {
        async fn create(&self, _task: crate::models::NewTask) -> Result<Task> {
            unimplemented!()
        }

        async fn get(&self, id: &str) -> Result<Option<Task>> {
            Ok((id == self.parent.id).then(|| self.parent.clone()))
        }

        async fn save(&self, task: Task) -> Result<Task> {
            Ok(task)
        }

        async fn update_with_version(&self, task: Task, _expected: u64) -> Result<Task> {
            Err(crate::error::OrchestrationError::ConcurrentModification(
                format!("task {}", task.id),
            ))
        }

        async fn find_by_branch(
            &self,
            _branch_id: &str,
            _filter: crate::models::TaskFilter,
        ) -> Result<Vec<Task>> {
            Ok(vec![])
        }

        async fn find_children(&self, _parent_id: &str) -> Result<Vec<Task>> {
            Ok(vec![])
        }

        async fn list(&self, _filter: crate::models::TaskFilter) -> Result<Vec<Task>> {
            Ok(vec![])
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingContexts {
        saved: parking_lot::Mutex<Vec<TaskContext>>,
    }

    #[async_trait]
    impl ContextRepository for RecordingContexts {
        async fn get_by_task(&self, _task_id: &str) -> Result<Option<TaskContext>> {
            Ok(None)
        }

        async fn save(&self, context: TaskContext) -> Result<TaskContext> {
            self.saved.lock().push(context.clone());
            Ok(context)
        }

        async fn delete_by_task(&self, _task_id: &str) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    /// A propagation that keeps losing the parent's version check must not
    /// fail the already-committed child mutation: the handler yields and
    /// still leaves the context note behind
    #[tokio::test]
    async fn test_recompute_yields_to_winning_writer() {
        let now = Utc::now();
        let parent = Task::seed("P", "Parent", "p", "branch-1", now);
        let contexts = Arc::new(RecordingContexts {
            saved: parking_lot::Mutex::new(Vec::new()),
        });
        let handler = ProgressPropagationHandler::new(
            Arc::new(ContendedTasks { parent }),
            contexts.clone(),
            2,
        );

        let event = DomainEvent::SubtaskProgressAggregated {
            parent_id: "P".to_string(),
            subtask_id: "C1".to_string(),
            subtask_progress: 100,
            note: ProgressAggregator::propagation_note("C1", 100, "done"),
        };
        let reactions = handler.handle(&event, now).await.unwrap();

        assert!(reactions.is_empty());
        let saved = contexts.saved.lock();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].progress_notes[0].text.contains("C1"));
    }
}
