//! Task state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one checklist task.
///
/// `Pending → InProgress → {Completed, Failed}`. A person may force any
/// non-completed task to `Completed`, and a `Failed` task may be sent back
/// to `Pending` for another run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its dependency, a worker slot, or a human.
    Pending,
    /// An integration call is running (or backing off between attempts).
    InProgress,
    /// Done. Terminal.
    Completed,
    /// Retries exhausted or the failure was not retryable.
    Failed,
}

impl TaskStatus {
    /// Check if a transition from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                // forced completion by a person
                | (Pending, Completed)
                | (Failed, Completed)
                // external retry
                | (Failed, Pending)
        )
    }

    /// Whether the orchestrator will not touch this task again on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
