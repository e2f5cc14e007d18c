//! Command gateway - 外部コマンドの入口
//!
//! Every command is validated and committed to the store before it returns;
//! the scheduler is only told about it afterwards.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Task, TaskError, TaskId, TaskSpec, TaskStatus};
use crate::pipeline::PipelineRegistry;
use crate::ports::{Commit, TaskStore};
use crate::scheduler::Scheduler;

/// Per-task actions that can also be applied in bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Delete,
    Restart,
    RetryLastStep,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Delete => "delete",
            TaskAction::Restart => "restart",
            TaskAction::RetryLastStep => "retry_last_step",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(TaskAction::Delete),
            "restart" => Ok(TaskAction::Restart),
            "retry_last_step" => Ok(TaskAction::RetryLastStep),
            other => Err(TaskError::validation(format!("unknown action '{other}'"))),
        }
    }
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReceipt {
    pub task_id: TaskId,
    pub message: String,
}

impl CommandReceipt {
    fn new(task_id: TaskId, message: String) -> Self {
        Self { task_id, message }
    }
}

/// Outcome of a bulk action. Each ID is handled on its own.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub succeeded: Vec<CommandReceipt>,
    pub failed: Vec<(TaskId, TaskError)>,
}

impl BulkReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct CommandGateway {
    store: Arc<dyn TaskStore>,
    pipelines: Arc<PipelineRegistry>,
    scheduler: Arc<Scheduler>,
}

impl CommandGateway {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pipelines: Arc<PipelineRegistry>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            store,
            pipelines,
            scheduler,
        }
    }

    /// Creates a queued task and wakes the scheduler.
    pub async fn add_task(&self, spec: TaskSpec) -> Result<Task, TaskError> {
        spec.validate()?;
        let Some(pipeline) = self.pipelines.get(&spec.task_type) else {
            return Err(TaskError::validation(format!(
                "unknown task type '{}'",
                spec.task_type
            )));
        };
        let task = self.store.create(spec, pipeline.step_names()).await?;
        info!(task_id = %task.id, task_type = %task.task_type, "task queued");
        self.scheduler.wake();
        Ok(task)
    }

    /// Removes the task now, or at its next step boundary if it is running.
    pub async fn delete(&self, id: TaskId) -> Result<CommandReceipt, TaskError> {
        let task = self
            .store
            .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                if t.status == TaskStatus::Running {
                    t.request_delete();
                    Ok(Commit::Save)
                } else {
                    Ok(Commit::Remove)
                }
            })
            .await?;

        if task.status == TaskStatus::Running {
            info!(task_id = %id, "delete deferred to next step boundary");
            Ok(CommandReceipt::new(
                id,
                format!("Task {id} will be deleted after its current step"),
            ))
        } else {
            self.scheduler.forget(id);
            info!(task_id = %id, "task deleted");
            Ok(CommandReceipt::new(id, format!("Task {id} deleted successfully")))
        }
    }

    /// Failed -> Queued at step 0.
    pub async fn restart(&self, id: TaskId) -> Result<CommandReceipt, TaskError> {
        self.store
            .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                t.restart()?;
                Ok(Commit::Save)
            })
            .await?;
        info!(task_id = %id, "task restarted");
        self.scheduler.wake();
        Ok(CommandReceipt::new(id, format!("Task {id} restarted successfully")))
    }

    /// Failed -> Running at the same step, handed straight to a worker.
    pub async fn retry_last_step(&self, id: TaskId) -> Result<CommandReceipt, TaskError> {
        let task = self
            .store
            .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                t.retry_last_step()?;
                Ok(Commit::Save)
            })
            .await?;
        info!(task_id = %id, step = task.current_step().unwrap_or_default(), "retrying last step");
        self.scheduler.hand_off(id);
        Ok(CommandReceipt::new(id, format!("Retrying last step for task {id}")))
    }

    pub async fn apply(&self, action: TaskAction, id: TaskId) -> Result<CommandReceipt, TaskError> {
        let result = match action {
            TaskAction::Delete => self.delete(id).await,
            TaskAction::Restart => self.restart(id).await,
            TaskAction::RetryLastStep => self.retry_last_step(id).await,
        };
        if let Err(e) = &result {
            warn!(task_id = %id, action = %action, error = %e, "command rejected");
        }
        result
    }

    /// Applies `action` to every ID; one failure does not stop the rest.
    pub async fn apply_bulk(&self, action: TaskAction, ids: &[TaskId]) -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            match self.apply(action, id).await {
                Ok(receipt) => report.succeeded.push(receipt),
                Err(e) => report.failed.push((id, e)),
            }
        }
        report
    }

    /// Removes every completed task.
    pub async fn delete_finished(&self) -> Result<usize, TaskError> {
        self.delete_where(TaskStatus::Completed).await
    }

    /// Removes every failed task.
    pub async fn delete_failed(&self) -> Result<usize, TaskError> {
        self.delete_where(TaskStatus::Failed).await
    }

    async fn delete_where(&self, status: TaskStatus) -> Result<usize, TaskError> {
        let mut removed = 0;
        for task in self.store.list_by_status(status).await? {
            // the status may have moved on since the listing
            let result = self
                .store
                .update(task.id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                    if t.status != status {
                        return Err(TaskError::InvalidState {
                            id: t.id,
                            status: t.status,
                            reason: "status changed before removal",
                        });
                    }
                    Ok(Commit::Remove)
                })
                .await;
            match result {
                Ok(_) => {
                    self.scheduler.forget(task.id);
                    removed += 1;
                }
                Err(TaskError::NotFound(_) | TaskError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        info!(status = %status, removed, "bulk delete");
        Ok(removed)
    }
}
