//! Test utilities for the orchestration engine.
//!
//! - [`repository`] - Recording repository wrappers with error injection
//! - [`builders`] - Fluent entity builders with realistic fake data
//! - [`fixtures`] - Canned scenario setups (task families, vision trees, agents)
//! - [`generators`] - Proptest strategies for the domain types

pub mod builders;
pub mod fixtures;
pub mod generators;
pub mod repository;

pub use builders::{AgentBuilder, ContextBuilder, ObjectiveBuilder, TaskBuilder};
pub use repository::{RecordingAgentRepository, RecordingTaskRepository};
