use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::ProgressType;

/// Mandatory companion record of every task, created lazily on first
/// mutation.
///
/// The context holds the completion summary (required before the task can
/// be marked done), testing notes, recommended follow-ups, and an
/// append-only log of progress notes. `last_updated` is never older than
/// any note it contains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    pub task_id: String,
    pub completion_summary: Option<String>,
    pub testing_notes: Option<String>,
    #[serde(default)]
    pub next_recommendations: Vec<String>,
    #[serde(default)]
    pub progress_notes: Vec<ProgressNote>,
    pub last_updated: DateTime<Utc>,
}

/// Append-only progress log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNote {
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub text: String,
    pub progress_type: ProgressType,
    pub percentage: Option<u8>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            completion_summary: None,
            testing_notes: None,
            next_recommendations: Vec::new(),
            progress_notes: Vec::new(),
            last_updated: now,
        }
    }

    /// Append a note and advance `last_updated` to cover it
    pub fn push_note(&mut self, note: ProgressNote) {
        if note.timestamp > self.last_updated {
            self.last_updated = note.timestamp;
        }
        self.progress_notes.push(note);
    }

    /// Record a context mutation that is not itself a note
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Whether a non-empty completion summary has been written
    pub fn has_completion_summary(&self) -> bool {
        self.completion_summary
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}
