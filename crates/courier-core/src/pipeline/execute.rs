//! Step-by-step execution of a claimed task.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{StepFailure, Task, TaskError, TaskId, TaskStatus};
use crate::ports::{Commit, TaskStore};

use super::{Pipeline, Step, StepContext, StepOutput};

#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Upper bound for a single step. A step that overruns is aborted and
    /// recorded as a transient failure.
    pub step_timeout: Option<Duration>,
}

/// How a run of [`Pipeline::execute`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Every remaining step succeeded.
    Completed,
    /// A step failed; the task is now `Failed` at that step.
    Failed(StepFailure),
    /// A delete request was honoured at a step boundary.
    Cancelled,
    /// The task disappeared from the store mid-run.
    Vanished,
    /// The run could not continue for a reason that is not the step's fault.
    Aborted(TaskError),
}

impl Pipeline {
    /// Runs the task from its current step to the end (or the first failure).
    ///
    /// The task must already be `Running`. After every step the outcome is
    /// persisted before the next one starts; a pending delete is honoured at
    /// each of those boundaries.
    pub async fn execute(
        &self,
        store: &dyn TaskStore,
        id: TaskId,
        opts: &ExecutionOptions,
    ) -> Execution {
        loop {
            // step 開始の記録。ここが delete の境界になる
            let started = store
                .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                    if t.delete_requested {
                        return Ok(Commit::Remove);
                    }
                    t.begin_step()?;
                    Ok(Commit::Save)
                })
                .await;
            let task = match started {
                Ok(task) if task.delete_requested => return Execution::Cancelled,
                Ok(task) => task,
                Err(TaskError::NotFound(_)) => return Execution::Vanished,
                Err(e) => return Execution::Aborted(e),
            };

            let index = task.current_step_index;
            let Some(named) = self.get(index) else {
                return Execution::Aborted(TaskError::Fatal(format!(
                    "pipeline '{}' has no step {index} for task {id}",
                    self.task_type()
                )));
            };
            if task.steps.get(index) != Some(&named.name) {
                return Execution::Aborted(TaskError::Fatal(format!(
                    "task {id} expects step {:?} at {index}, pipeline '{}' has '{}'",
                    task.steps.get(index),
                    self.task_type(),
                    named.name
                )));
            }

            debug!(task_id = %id, step = %named.name, index, attempt = task.attempts, "step started");
            let ctx = StepContext {
                task,
                step: named.name.clone(),
                index,
            };
            let result = run_isolated(Arc::clone(&named.step), ctx, opts.step_timeout).await;

            match result {
                Ok(output) => {
                    let recorded = store
                        .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                            if t.delete_requested {
                                return Ok(Commit::Remove);
                            }
                            if let Some(received) = output.received_images {
                                t.received_images = received;
                            }
                            t.complete_step()?;
                            Ok(Commit::Save)
                        })
                        .await;
                    match recorded {
                        Ok(task) if task.delete_requested => return Execution::Cancelled,
                        Ok(task) if task.status == TaskStatus::Completed => {
                            return Execution::Completed;
                        }
                        Ok(_) => debug!(task_id = %id, step = %named.name, "step done"),
                        Err(TaskError::NotFound(_)) => return Execution::Vanished,
                        Err(e) => return Execution::Aborted(e),
                    }
                }
                Err(failure) => {
                    warn!(
                        task_id = %id,
                        step = %named.name,
                        kind = failure.error_kind().code(),
                        error = %failure,
                        "step failed"
                    );
                    let recorded = store
                        .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                            if t.delete_requested {
                                return Ok(Commit::Remove);
                            }
                            t.fail(&failure);
                            Ok(Commit::Save)
                        })
                        .await;
                    return match recorded {
                        Ok(task) if task.delete_requested => Execution::Cancelled,
                        Ok(_) => Execution::Failed(failure),
                        Err(TaskError::NotFound(_)) => Execution::Vanished,
                        Err(e) => Execution::Aborted(e),
                    };
                }
            }
        }
    }
}

/// Runs one step on its own tokio task so a panic stays inside it.
async fn run_isolated(
    step: Arc<dyn Step>,
    ctx: StepContext,
    timeout: Option<Duration>,
) -> Result<StepOutput, StepFailure> {
    let name = ctx.step.clone();
    let handle = tokio::spawn(async move { step.run(&ctx).await });
    let abort = handle.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return Err(StepFailure::transient(
                    format!("{name} timed out"),
                    format!("step '{name}' did not finish within {}ms", limit.as_millis()),
                ));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            Err(StepFailure::step(
                format!("{name} crashed"),
                format!("step '{name}' panicked: {}", panic_message(&*payload)),
            ))
        }
        Err(e) => Err(StepFailure::step(
            format!("{name} cancelled"),
            format!("step '{name}' was cancelled: {e}"),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
