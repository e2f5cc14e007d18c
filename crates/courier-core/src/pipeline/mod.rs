//! Pipelines - 順序付きの step 列
//!
//! A task type maps to one [`Pipeline`]. Each step is an async [`Step`]
//! implementation; the pipeline runs them in order against the store,
//! persisting progress after every step so a retry or a restart knows exactly
//! where to pick up.

mod execute;
mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{StepFailure, Task, TaskType};

pub use execute::{Execution, ExecutionOptions};
pub use registry::{PipelineRegistry, RegistryError};

/// What a step sees: a snapshot of the task taken when the step began.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub task: Task,
    pub step: String,
    pub index: usize,
}

/// Facts a step reports back to the task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub received_images: Option<u32>,
}

impl StepOutput {
    pub fn received(images: u32) -> Self {
        Self {
            received_images: Some(images),
        }
    }
}

/// One stage of a pipeline.
///
/// Steps must not touch the store themselves; the pipeline records the
/// outcome. A panic inside `run` is caught and recorded as a step failure.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure>;
}

#[derive(Clone)]
pub struct NamedStep {
    pub name: String,
    pub step: Arc<dyn Step>,
}

impl fmt::Debug for NamedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedStep").field("name", &self.name).finish()
    }
}

/// The steps of one task type, in execution order.
#[derive(Debug, Clone)]
pub struct Pipeline {
    task_type: TaskType,
    steps: Vec<NamedStep>,
}

impl Pipeline {
    pub fn new(task_type: impl Into<TaskType>) -> Self {
        Self {
            task_type: task_type.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.steps.push(NamedStep {
            name: name.into(),
            step: Arc::new(step),
        });
        self
    }

    /// Appends a step that is shared with other pipelines.
    pub fn shared_step(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.push(NamedStep {
            name: name.into(),
            step,
        });
        self
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Step names, copied onto every task created for this pipeline.
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&NamedStep> {
        self.steps.get(index)
    }
}
