//! Task record: spec + progress + status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{StepFailure, TaskError};
use super::ids::TaskId;
use super::spec::{Subject, TaskSpec};
use super::state::TaskStatus;
use super::task_type::TaskType;

/// The unit of work, as stored.
///
/// Design:
/// - This is the single source of truth for a task; the store hands out clones.
/// - Every status transition goes through a method here, so the invariants
///   (`status_full_msg` only on failure, index only moving forward except on
///   restart) live in one place.
/// - `updated_at` is stamped by the store when a mutation commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,

    /// Short status for the task table.
    pub status_msg: String,

    /// Full error detail; present only while `status == Failed`.
    pub status_full_msg: Option<String>,

    pub source: String,
    pub destinations: Vec<String>,
    pub subject: Subject,

    /// Images received so far by the retrieve step.
    pub received_images: u32,

    pub steps: Vec<String>,
    pub current_step_index: usize,

    /// Step executions performed, retries and restarts included.
    pub attempts: u32,

    /// Set when a delete arrives while a step is running; honoured at the next step boundary.
    pub delete_requested: bool,

    pub visible: bool,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What finishing the current step did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepProgress {
    /// Moved on to the next step.
    Advanced,
    /// That was the last step.
    Finished,
}

impl Task {
    pub fn new(id: TaskId, spec: TaskSpec, steps: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task_type: spec.task_type,
            status: TaskStatus::Queued,
            status_msg: "queued".to_string(),
            status_full_msg: None,
            source: spec.source,
            destinations: spec.destinations,
            subject: spec.subject,
            received_images: 0,
            steps,
            current_step_index: 0,
            attempts: 0,
            delete_requested: false,
            visible: spec.visible,
            started_at: now,
            updated_at: now,
        }
    }

    /// Only failed tasks accept retry-last-step and restart.
    pub fn retryable(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn current_step(&self) -> Option<&str> {
        self.steps.get(self.current_step_index).map(String::as_str)
    }

    fn invalid(&self, reason: &'static str) -> TaskError {
        TaskError::InvalidState {
            id: self.id,
            status: self.status,
            reason,
        }
    }

    /// Queued -> Running (a worker takes the task).
    pub fn claim(&mut self) -> Result<(), TaskError> {
        if !self.status.is_runnable() {
            return Err(self.invalid("only queued tasks can be claimed"));
        }
        self.status = TaskStatus::Running;
        self.status_msg = "starting".to_string();
        Ok(())
    }

    /// Records the start of the step at `current_step_index`.
    pub fn begin_step(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid("steps only run while the task is running"));
        }
        let step = self
            .current_step()
            .ok_or_else(|| {
                TaskError::Fatal(format!(
                    "task {} has no step at index {}",
                    self.id, self.current_step_index
                ))
            })?
            .to_string();
        self.attempts += 1;
        self.status_msg = format!(
            "{step} ({}/{})",
            self.current_step_index + 1,
            self.steps.len()
        );
        Ok(())
    }

    /// Records success of the current step. The index stays on the last step
    /// once the task completes.
    pub fn complete_step(&mut self) -> Result<StepProgress, TaskError> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid("only running tasks can complete a step"));
        }
        if self.current_step_index + 1 < self.steps.len() {
            let done = self.current_step().unwrap_or_default().to_string();
            self.current_step_index += 1;
            self.status_msg = format!("{done} done");
            Ok(StepProgress::Advanced)
        } else {
            self.status = TaskStatus::Completed;
            self.status_msg = "completed".to_string();
            Ok(StepProgress::Finished)
        }
    }

    /// Running -> Failed, keeping the index on the failing step.
    pub fn fail(&mut self, failure: &StepFailure) {
        self.status = TaskStatus::Failed;
        self.status_msg = failure.message.clone();
        self.status_full_msg = Some(non_empty(&failure.detail, &failure.message));
    }

    /// Marks the task failed because of a scheduler-side error.
    pub fn fail_internal(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        self.status = TaskStatus::Failed;
        self.status_msg = "internal error".to_string();
        self.status_full_msg = Some(non_empty(&detail, "internal error"));
    }

    /// Failed -> Queued, back to the first step.
    pub fn restart(&mut self) -> Result<(), TaskError> {
        if !self.retryable() {
            return Err(self.invalid("only failed tasks can be restarted"));
        }
        self.status = TaskStatus::Queued;
        self.current_step_index = 0;
        self.received_images = 0;
        self.status_msg = "restarting...".to_string();
        self.status_full_msg = None;
        Ok(())
    }

    /// Failed -> Running, same step index.
    pub fn retry_last_step(&mut self) -> Result<(), TaskError> {
        if !self.retryable() {
            return Err(self.invalid("only failed tasks can retry their last step"));
        }
        self.status = TaskStatus::Running;
        self.status_msg = "retrying...".to_string();
        self.status_full_msg = None;
        Ok(())
    }

    pub fn request_delete(&mut self) {
        self.delete_requested = true;
        self.status_msg = "deleting after current step".to_string();
    }

    /// Running -> Queued after an unclean stop. The index still points at the
    /// first step that has not been persisted as done.
    pub fn recover(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid("only running tasks can be recovered"));
        }
        self.status = TaskStatus::Queued;
        self.status_msg = "resuming".to_string();
        Ok(())
    }
}

fn non_empty(primary: &str, fallback: &str) -> String {
    if primary.trim().is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}
