//! Task status machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Queued -> Running -> Completed
/// - Queued -> Running -> Failed
/// - Failed -> Queued  (restart: step index reset to 0)
/// - Failed -> Running (retry-last-step: same step index)
/// - Running -> Queued (recovery after an unclean stop, step index kept)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker.
    Queued,

    /// Owned by a worker (or handed over to one by retry-last-step).
    Running,

    /// Every step succeeded.
    Completed,

    /// A step failed; the task waits for retry, restart or delete.
    Failed,
}

impl TaskStatus {
    /// Eligible for a worker to claim.
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Queued)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Queued, true)]
    #[case(TaskStatus::Running, false)]
    #[case(TaskStatus::Completed, false)]
    #[case(TaskStatus::Failed, false)]
    fn only_queued_is_runnable(#[case] status: TaskStatus, #[case] runnable: bool) {
        assert_eq!(status.is_runnable(), runnable);
    }

    #[test]
    fn serializes_as_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(s, "\"completed\"");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }
}
