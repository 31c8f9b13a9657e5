use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress dimensions a snapshot can be filed under.
///
/// Every dimension except `General` is expected to move forward; a lower
/// percentage than the last snapshot of the same type is rejected unless
/// the snapshot is marked as a correction. `General` is overall
/// self-reported progress and may go down freely.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProgressType {
    Analysis,
    Design,
    Implementation,
    Testing,
    Documentation,
    Review,
    Deployment,
    General,
}

impl ProgressType {
    pub const ALL: [ProgressType; 8] = [
        ProgressType::Analysis,
        ProgressType::Design,
        ProgressType::Implementation,
        ProgressType::Testing,
        ProgressType::Documentation,
        ProgressType::Review,
        ProgressType::Deployment,
        ProgressType::General,
    ];
}

impl std::fmt::Display for ProgressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProgressType::Analysis => "analysis",
            ProgressType::Design => "design",
            ProgressType::Implementation => "implementation",
            ProgressType::Testing => "testing",
            ProgressType::Documentation => "documentation",
            ProgressType::Review => "review",
            ProgressType::Deployment => "deployment",
            ProgressType::General => "general",
        };
        write!(f, "{s}")
    }
}

/// Structured context carried by a progress snapshot
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Reporter confidence in the figure, 0.0..=1.0
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    /// Marks an intentional downward revision of a non-general percentage
    #[serde(default)]
    pub correction: bool,
}

/// Immutable point-in-time progress record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub id: String,
    pub task_id: String,
    pub progress_type: ProgressType,
    /// Percent complete; `None` means the reporter could not quantify it
    pub percentage: Option<u8>,
    pub description: String,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
}

/// Append-only log of progress snapshots owned by one task
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProgressTimeline {
    pub snapshots: Vec<ProgressSnapshot>,
}

impl ProgressTimeline {
    /// Latest snapshot of the given type, if any
    pub fn latest_of(&self, progress_type: ProgressType) -> Option<&ProgressSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.progress_type == progress_type)
    }

    /// Latest recorded percentage of the given type, if any
    pub fn latest_percentage_of(&self, progress_type: ProgressType) -> Option<u8> {
        self.snapshots
            .iter()
            .rev()
            .filter(|s| s.progress_type == progress_type)
            .find_map(|s| s.percentage)
    }

    /// Types that have at least one snapshot, in enum order
    pub fn reported_types(&self) -> Vec<ProgressType> {
        ProgressType::ALL
            .iter()
            .copied()
            .filter(|t| self.snapshots.iter().any(|s| s.progress_type == *t))
            .collect()
    }

    pub fn push(&mut self, snapshot: ProgressSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Next snapshot id for the owning task, stable under replays of the
    /// same timeline length
    pub fn next_snapshot_id(&self, task_id: &str) -> String {
        format!("{}-ps-{:04}", task_id, self.snapshots.len() + 1)
    }
}

/// Named percentage threshold attached to a task.
///
/// `fired_at` makes firing idempotent per upward crossing: it is set when
/// overall progress crosses the threshold from below and cleared (without
/// any retraction event) when progress later drops back under it, re-arming
/// the milestone for the next crossing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub name: String,
    pub threshold: u8,
    pub fired_at: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn new(name: impl Into<String>, threshold: u8) -> Self {
        Self {
            name: name.into(),
            threshold,
            fired_at: None,
        }
    }

    /// Standard milestone set given to tasks created without a custom one
    pub fn defaults() -> Vec<Milestone> {
        vec![
            Milestone::new("quarter", 25),
            Milestone::new("halfway", 50),
            Milestone::new("three-quarters", 75),
            Milestone::new("complete", 100),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(progress_type: ProgressType, percentage: Option<u8>) -> ProgressSnapshot {
        ProgressSnapshot {
            id: "task-1-ps-0001".to_string(),
            task_id: "task-1".to_string(),
            progress_type,
            percentage,
            description: "work".to_string(),
            metadata: SnapshotMetadata::default(),
            timestamp: Utc::now(),
            agent_id: None,
        }
    }

    #[test]
    fn test_latest_of_picks_most_recent() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Implementation, Some(20)));
        timeline.push(snapshot(ProgressType::Testing, Some(10)));
        timeline.push(snapshot(ProgressType::Implementation, Some(60)));

        assert_eq!(
            timeline.latest_percentage_of(ProgressType::Implementation),
            Some(60)
        );
        assert_eq!(timeline.latest_percentage_of(ProgressType::Testing), Some(10));
        assert_eq!(timeline.latest_percentage_of(ProgressType::General), None);
    }

    #[test]
    fn test_latest_percentage_skips_unquantified() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Design, Some(40)));
        timeline.push(snapshot(ProgressType::Design, None));

        // The unquantified snapshot is latest, but the latest figure is 40
        assert_eq!(timeline.latest_percentage_of(ProgressType::Design), Some(40));
    }

    #[test]
    fn test_reported_types_in_stable_order() {
        let mut timeline = ProgressTimeline::default();
        timeline.push(snapshot(ProgressType::Testing, Some(10)));
        timeline.push(snapshot(ProgressType::Analysis, Some(90)));

        assert_eq!(
            timeline.reported_types(),
            vec![ProgressType::Analysis, ProgressType::Testing]
        );
    }

    #[test]
    fn test_default_milestones() {
        let defaults = Milestone::defaults();
        assert_eq!(defaults.len(), 4);
        assert!(defaults.iter().all(|m| m.fired_at.is_none()));
        assert_eq!(defaults.last().unwrap().threshold, 100);
    }
}
