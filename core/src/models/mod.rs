//! Core domain models.
//!
//! The task aggregate (task + context + progress timeline) sits at the
//! centre; vision objectives, agents, and hints hang off it by id.

pub mod agent;
pub mod context;
pub mod hint;
pub mod progress;
pub mod task;
pub mod vision;

pub use agent::{
    Agent, AgentAvailability, Assignment, AssignmentConflict, ConflictStrategy, Handoff,
    HandoffState,
};
pub use context::{ProgressNote, TaskContext};
pub use hint::{HintFeedback, HintKind, HintPriority, WorkflowHint};
pub use progress::{
    Milestone, ProgressSnapshot, ProgressTimeline, ProgressType, SnapshotMetadata,
};
pub use task::{NewTask, Priority, Task, TaskFilter, TaskPatch, TaskStatus};
pub use vision::{
    ContributionKind, InsightKind, ObjectiveStatus, StrategicInsight, TargetMetric,
    VisionAlignment, VisionContext, VisionHierarchy, VisionLevel, VisionObjective,
};
