//! Context discipline rules, checked at mutation time and never deferred.

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::{OrchestrationError, Result},
    models::{
        ProgressSnapshot, ProgressTimeline, ProgressType, Task, TaskContext, TaskStatus,
    },
};

/// Enforces the workflow rules that gate completion and progress reporting.
///
/// Completion gates fail the call; staleness only produces advisory data
/// for the hint engine and never blocks anything.
#[derive(Debug, Clone)]
pub struct ContextEnforcer {
    staleness_threshold: Duration,
}

impl ContextEnforcer {
    pub fn new(staleness_threshold: Duration) -> Self {
        Self {
            staleness_threshold,
        }
    }

    /// Completing a task requires a non-empty completion summary on the
    /// call itself. Returns the trimmed summary to be written to context.
    ///
    /// # Returns
    /// * `Ok(String)` - The accepted summary
    /// * `Err(OrchestrationError::MissingCompletionSummary)` - If absent or blank
    pub fn require_completion_summary(
        &self,
        task_id: &str,
        summary: Option<&str>,
    ) -> Result<String> {
        match summary.map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(OrchestrationError::MissingCompletionSummary(
                task_id.to_string(),
            )),
        }
    }

    /// A parent can only complete once every child is done
    ///
    /// # Returns
    /// * `Err(OrchestrationError::IncompleteSubtasks)` - Listing the open ids
    pub fn require_subtasks_done(&self, task: &Task, children: &[Task]) -> Result<()> {
        let open: Vec<String> = children
            .iter()
            .filter(|c| c.status != TaskStatus::Done)
            .map(|c| c.id.clone())
            .collect();
        if open.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::IncompleteSubtasks {
                task_id: task.id.clone(),
                open_subtasks: open,
            })
        }
    }

    /// A progress report needs a description, and either a percentage or
    /// metadata notes explaining why none is known
    pub fn check_progress_report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        if snapshot.description.trim().is_empty() {
            return Err(OrchestrationError::empty_field("description"));
        }
        if let Some(pct) = snapshot.percentage {
            if pct > 100 {
                return Err(OrchestrationError::Validation(
                    "percentage must be between 0 and 100".to_string(),
                ));
            }
        } else {
            let explained = snapshot
                .metadata
                .notes
                .as_deref()
                .map(|n| !n.trim().is_empty())
                .unwrap_or(false);
            if !explained {
                return Err(OrchestrationError::Validation(
                    "a report without a percentage must carry metadata.notes explaining why"
                        .to_string(),
                ));
            }
        }
        if let Some(confidence) = snapshot.metadata.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(OrchestrationError::Validation(
                    "metadata.confidence must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Non-general percentages may not regress unless the snapshot is
    /// marked as a correction; general progress may go down freely
    pub fn check_monotonic(
        &self,
        timeline: &ProgressTimeline,
        snapshot: &ProgressSnapshot,
    ) -> Result<()> {
        if snapshot.progress_type == ProgressType::General || snapshot.metadata.correction {
            return Ok(());
        }
        let (Some(new_pct), Some(last_pct)) = (
            snapshot.percentage,
            timeline.latest_percentage_of(snapshot.progress_type),
        ) else {
            return Ok(());
        };
        if new_pct < last_pct {
            return Err(OrchestrationError::Validation(format!(
                "{} progress would drop from {last_pct}% to {new_pct}%; mark the report as a correction if that is intended",
                snapshot.progress_type
            )));
        }
        Ok(())
    }

    /// Time since the last context update when it exceeds the threshold and
    /// the task is in progress; `None` otherwise. Advisory only.
    pub fn staleness(
        &self,
        task: &Task,
        context: Option<&TaskContext>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        if task.status != TaskStatus::InProgress {
            return None;
        }
        let last = context.map(|c| c.last_updated).unwrap_or(task.updated_at);
        let elapsed = now - last;
        (elapsed > self.staleness_threshold).then_some(elapsed)
    }
}
