//! Orchestration Core
//!
//! Vision-driven task orchestration engine for AI agents. Every tool
//! invocation runs as a stateless request-scoped transaction that enforces
//! workflow invariants (context discipline, completion gating, subtask
//! aggregation), enriches the reply with strategic alignment data, routes
//! work among agents, and attaches deterministic workflow guidance.
//!
//! # Architecture
//!
//! - [`models`] - Domain models (Task, Context, Progress, Vision, Agent, Hint)
//! - [`error`] - Error taxonomy and result handling
//! - [`repository`] - Repository ports for the five stores
//! - [`events`] - Domain events and the per-request synchronous bus
//! - [`enforcement`] - Context discipline rules (completion gates, staleness)
//! - [`aggregation`] - Progress arithmetic, milestones, parent propagation
//! - [`alignment`] - Vision alignment scoring and the TTL'd cache
//! - [`coordination`] - Assignment, handoff protocol, conflict resolution
//! - [`guidance`] - Deterministic hint rule engine
//! - [`protocol`] - Wire parameter shapes and the response envelope
//! - [`usecases`] - One transactional use-case per tool
//! - [`dispatcher`] - Tool routing, deadlines, uniform envelope
//!
//! # Example
//!
//! ```rust,no_run
//! use orchestration_core::dispatcher::ToolDispatcher;
//! use serde_json::json;
//!
//! # async fn run(deps: orchestration_core::usecases::EngineDeps) {
//! let dispatcher = ToolDispatcher::new(deps);
//! let reply = dispatcher
//!     .dispatch("manage_task", json!({ "action": "list" }))
//!     .await;
//! assert!(reply.workflow_guidance.next_actions.len() <= 16);
//! # }
//! ```

pub mod aggregation;
pub mod alignment;
pub mod config;
pub mod coordination;
pub mod dispatcher;
pub mod enforcement;
pub mod error;
pub mod events;
pub mod guidance;
pub mod models;
pub mod protocol;
pub mod repository;
pub mod usecases;

// Re-export commonly used types at the crate root for convenience
pub use config::EngineConfig;
pub use dispatcher::ToolDispatcher;
pub use error::{ErrorCode, OrchestrationError, Result};
pub use events::{DomainEvent, EventBus, EventHandler};
pub use guidance::{HintEngine, Phase, WorkflowGuidance};
pub use models::{
    Agent, Assignment, Handoff, HandoffState, Milestone, Priority, ProgressSnapshot,
    ProgressType, Task, TaskContext, TaskFilter, TaskStatus, VisionAlignment, VisionObjective,
    WorkflowHint,
};
pub use protocol::{ToolError, ToolResponse};
pub use repository::{
    AgentRepository, ContextRepository, HintRepository, TaskRepository, VisionRepository,
};
pub use usecases::{EngineDeps, EngineServices};

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
