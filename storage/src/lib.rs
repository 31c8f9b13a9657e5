//! In-memory reference implementations of the orchestration repository
//! ports.
//!
//! The engine specifies its data model, not its persistence substrate;
//! this crate is the substrate the binary and the integration tests run
//! against. Every store is thread-safe, and the task store honours the
//! optimistic version protocol the use-cases rely on.

mod memory;

pub use memory::{
    MemoryAgentStore, MemoryContextStore, MemoryHintStore, MemoryStores, MemoryTaskStore,
    MemoryVisionStore,
};
