//! Server crate: configuration, telemetry, and the stdio serving loop
//! around the orchestration engine.

pub mod config;
pub mod stdio;
pub mod telemetry;

use orchestration_core::ToolDispatcher;
use storage::MemoryStores;

/// Build a dispatcher over fresh in-memory stores
pub fn build_dispatcher(config: &config::Config) -> (ToolDispatcher, MemoryStores) {
    let stores = MemoryStores::new();
    let dispatcher = ToolDispatcher::new(stores.deps(config.engine.clone()));
    (dispatcher, stores)
}
