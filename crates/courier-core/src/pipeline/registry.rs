//! PipelineRegistry - task type ごとの pipeline を管理

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::TaskType;

use super::Pipeline;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("pipeline for task type '{0}' is already registered")]
    AlreadyRegistered(TaskType),

    #[error("pipeline for task type '{0}' has no steps")]
    Empty(TaskType),

    #[error("pipeline for task type '{task_type}' has step '{step}' twice")]
    DuplicateStep { task_type: TaskType, step: String },
}

/// Task type -> pipeline.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<TaskType, Arc<Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: Pipeline) -> Result<(), RegistryError> {
        let task_type = pipeline.task_type().clone();
        if self.pipelines.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        if pipeline.is_empty() {
            return Err(RegistryError::Empty(task_type));
        }
        let mut seen = HashSet::new();
        for name in pipeline.step_names() {
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateStep {
                    task_type,
                    step: name,
                });
            }
        }
        self.pipelines.insert(task_type, Arc::new(pipeline));
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<Arc<Pipeline>> {
        self.pipelines.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.pipelines.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.pipelines.keys().cloned().collect();
        types.sort();
        types
    }
}
