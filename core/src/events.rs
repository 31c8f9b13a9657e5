//! Domain events and the per-request synchronous event bus.
//!
//! Events emitted inside one use-case are dispatched in emission order;
//! handlers run before the reply is returned so their effects are visible
//! to the caller. Handlers may emit reactions, which are processed at
//! depth + 1; reactions past the configured depth limit are dropped.
//!
//! Dispatch comes in two modes, split around the use-case's commit point
//! (the versioned write of its primary aggregate):
//!
//! - [`EventBus::dispatch`] aborts on the first handler error. It is the
//!   strict primitive for callers that have not committed anything yet.
//! - [`EventBus::dispatch_committed`] is for events whose originating
//!   write is already durable. A committed mutation must never be
//!   reported back as failed, so handler errors here are logged, that
//!   event's chain stops, and the remaining events still run; derived
//!   state (parent aggregates, caches) re-converges on the next mutation.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Result,
    models::{AgentAvailability, ConflictStrategy, ProgressType, TaskStatus},
};

/// Everything that can happen inside one tool invocation
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task_id: String,
        branch_id: String,
    },
    TaskStatusChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskCompleted {
        task_id: String,
    },
    TaskDeleted {
        task_id: String,
        cascaded: Vec<String>,
    },
    ContextUpdated {
        task_id: String,
    },
    ProgressReported {
        task_id: String,
        progress_type: ProgressType,
        percentage: Option<u8>,
    },
    ProgressMilestoneReached {
        task_id: String,
        milestone: String,
        threshold: u8,
    },
    /// A subtask changed in a way that must flow into its parent's overall
    /// progress and context note
    SubtaskProgressAggregated {
        parent_id: String,
        subtask_id: String,
        subtask_progress: u8,
        note: String,
    },
    /// The subtask set under a parent changed (create/delete); the parent
    /// must recompute but no context note is written
    SubtaskSetChanged {
        parent_id: String,
        subtask_id: String,
    },
    AgentAssigned {
        task_id: String,
        agent_id: String,
    },
    AgentUnassigned {
        task_id: String,
        agent_id: String,
    },
    HandoffRequested {
        handoff_id: String,
        task_id: String,
        from_agent: String,
        to_agent: String,
    },
    HandoffAccepted {
        handoff_id: String,
        task_id: String,
    },
    HandoffRejected {
        handoff_id: String,
        task_id: String,
        reason: Option<String>,
    },
    HandoffCompleted {
        handoff_id: String,
        task_id: String,
    },
    ConflictDetected {
        conflict_id: String,
        task_id: String,
    },
    ConflictResolved {
        conflict_id: String,
        task_id: String,
        strategy: ConflictStrategy,
    },
    AgentStatusChanged {
        agent_id: String,
        status: AgentAvailability,
    },
}

impl DomainEvent {
    /// Stable tag used for logging and handler interest checks
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "task_created",
            DomainEvent::TaskStatusChanged { .. } => "task_status_changed",
            DomainEvent::TaskCompleted { .. } => "task_completed",
            DomainEvent::TaskDeleted { .. } => "task_deleted",
            DomainEvent::ContextUpdated { .. } => "context_updated",
            DomainEvent::ProgressReported { .. } => "progress_reported",
            DomainEvent::ProgressMilestoneReached { .. } => "progress_milestone_reached",
            DomainEvent::SubtaskProgressAggregated { .. } => "subtask_progress_aggregated",
            DomainEvent::SubtaskSetChanged { .. } => "subtask_set_changed",
            DomainEvent::AgentAssigned { .. } => "agent_assigned",
            DomainEvent::AgentUnassigned { .. } => "agent_unassigned",
            DomainEvent::HandoffRequested { .. } => "handoff_requested",
            DomainEvent::HandoffAccepted { .. } => "handoff_accepted",
            DomainEvent::HandoffRejected { .. } => "handoff_rejected",
            DomainEvent::HandoffCompleted { .. } => "handoff_completed",
            DomainEvent::ConflictDetected { .. } => "conflict_detected",
            DomainEvent::ConflictResolved { .. } => "conflict_resolved",
            DomainEvent::AgentStatusChanged { .. } => "agent_status_changed",
        }
    }
}

/// Synchronous in-process event handler.
///
/// Handlers persist their own effects through the repositories they hold
/// and may return reaction events. An `Err` from any handler aborts the
/// enclosing use-case.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn interested_in(&self, event: &DomainEvent) -> bool;

    async fn handle(&self, event: &DomainEvent, now: DateTime<Utc>) -> Result<Vec<DomainEvent>>;
}

/// Per-request FIFO event dispatcher.
///
/// The handler list is fixed at construction; `dispatch` owns a local queue
/// so concurrent requests never share dispatch state.
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
    depth_limit: usize,
}

impl EventBus {
    pub fn new(depth_limit: usize) -> Self {
        Self {
            handlers: Vec::new(),
            depth_limit,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Dispatch events whose originating write has already committed.
    ///
    /// Each initial event runs as its own chain through [`EventBus::dispatch`];
    /// a handler error cuts that chain, is logged, and does not touch the
    /// remaining events or the caller's reply. Returns every event that was
    /// fully processed, in processing order.
    pub async fn dispatch_committed(
        &self,
        initial: Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Vec<DomainEvent> {
        let mut processed = Vec::new();
        for event in initial {
            let name = event.name();
            match self.dispatch(vec![event], now).await {
                Ok(mut chain) => processed.append(&mut chain),
                Err(error) => {
                    tracing::warn!(
                        event = name,
                        %error,
                        "post-commit event handler failed; derived state heals on the next mutation"
                    );
                }
            }
        }
        processed
    }

    /// Dispatch the given events in order, feeding handler reactions back
    /// into the queue at depth + 1, aborting on the first handler error.
    /// Returns every event processed, including reactions, in processing
    /// order.
    pub async fn dispatch(
        &self,
        initial: Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>> {
        let mut queue: VecDeque<(DomainEvent, usize)> =
            initial.into_iter().map(|e| (e, 0)).collect();
        let mut processed = Vec::new();

        while let Some((event, depth)) = queue.pop_front() {
            for handler in &self.handlers {
                if !handler.interested_in(&event) {
                    continue;
                }
                let reactions = handler.handle(&event, now).await?;
                if reactions.is_empty() {
                    continue;
                }
                if depth + 1 > self.depth_limit {
                    tracing::warn!(
                        handler = handler.name(),
                        event = event.name(),
                        depth = depth + 1,
                        dropped = reactions.len(),
                        "Event reaction chain exceeded depth limit; reactions dropped"
                    );
                    continue;
                }
                for reaction in reactions {
                    queue.push_back((reaction, depth + 1));
                }
            }
            processed.push(event);
        }

        Ok(processed)
    }
}
