//! Errors - エラー型と分類
//!
//! Two families:
//! - [`TaskError`]: command / store / scheduler errors, returned to callers.
//! - [`StepFailure`]: what a pipeline step reports; it is recorded on the task
//!   (`status_msg` / `status_full_msg`) instead of being propagated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::TaskId;
use super::state::TaskStatus;

/// Operational classification shared by every error the core produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed command or task spec.
    Validation,
    /// Unknown task ID.
    NotFound,
    /// Command not valid for the task's current status.
    InvalidState,
    /// A pipeline step failed.
    StepFailure,
    /// Network or device unreachable. Eligible for manual retry only.
    TransientIo,
    /// Internal inconsistency while running a task.
    FatalScheduler,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::StepFailure => "STEP_FAILURE",
            ErrorKind::TransientIo => "TRANSIENT_IO",
            ErrorKind::FatalScheduler => "FATAL_SCHEDULER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("Task {0} doesn't exist")]
    NotFound(TaskId),

    #[error("Task {id} is {status}: {reason}")]
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        reason: &'static str,
    },

    #[error("internal scheduler error: {0}")]
    Fatal(String),

    /// The store could not read or write its backing file.
    #[error("task store error: {0}")]
    Storage(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Validation(_) => ErrorKind::Validation,
            TaskError::NotFound(_) => ErrorKind::NotFound,
            TaskError::InvalidState { .. } => ErrorKind::InvalidState,
            TaskError::Fatal(_) | TaskError::Storage(_) => ErrorKind::FatalScheduler,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }
}

/// How a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step ran and reported an error.
    Step,
    /// A remote device or service could not be reached.
    TransientIo,
}

/// Structured failure returned by a step: a short message for the task table
/// and a full detail for the detail view.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: String,
}

impl StepFailure {
    pub fn step(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Step,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn transient(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TransientIo,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self.kind {
            FailureKind::Step => ErrorKind::StepFailure,
            FailureKind::TransientIo => ErrorKind::TransientIo,
        }
    }

    /// Prefixes the detail with where the failure happened.
    pub fn with_context(mut self, context: impl AsRef<str>) -> Self {
        self.detail = format!("{}: {}", context.as_ref(), self.detail);
        self
    }
}
