//! Input spec for a new task.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::task_type::TaskType;

/// Descriptive metadata of the study/series a task moves.
/// Display and filtering only; never used for control flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub patient_id: String,

    #[serde(default)]
    pub patient_name: String,

    #[serde(default)]
    pub study_instance_uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_date: Option<NaiveDate>,

    #[serde(default)]
    pub series_description: String,

    /// Number of images the source announced for the series.
    #[serde(default)]
    pub expected_images: u32,
}

/// What a client submits to create a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: TaskType,

    /// Device the images come from.
    pub source: String,

    /// Devices the images go to, in forwarding order.
    pub destinations: Vec<String>,

    #[serde(default)]
    pub subject: Subject,

    /// Hidden tasks still run but are left out of the status feed.
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl TaskSpec {
    pub fn new(task_type: impl Into<TaskType>, source: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            source: source.into(),
            destinations: Vec::new(),
            subject: Subject::default(),
            visible: true,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destinations.push(destination.into());
        self
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Shape checks that do not need the pipeline registry.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.task_type.as_str().trim().is_empty() {
            return Err(TaskError::validation("task_type cannot be empty"));
        }
        if self.source.trim().is_empty() {
            return Err(TaskError::validation("source cannot be empty"));
        }
        if self.destinations.is_empty() {
            return Err(TaskError::validation("at least one destination is required"));
        }
        for (i, destination) in self.destinations.iter().enumerate() {
            if destination.trim().is_empty() {
                return Err(TaskError::validation(format!(
                    "destination #{} is empty",
                    i + 1
                )));
            }
            if self.destinations[..i].contains(destination) {
                return Err(TaskError::validation(format!(
                    "destination '{destination}' is listed more than once"
                )));
            }
        }
        Ok(())
    }
}
