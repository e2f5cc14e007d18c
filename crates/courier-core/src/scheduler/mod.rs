//! Scheduler - bounded worker pool over the task store.
//!
//! # 方針
//! - K workers; at most K tasks execute at once.
//! - Retries handed off by the command gateway are served before queued work.
//! - Queued tasks are claimed oldest first.
//! - A per-task execution lock guarantees one runner per task.
//! - Workers sleep on a [`Notify`] and also poll, so a missed wake-up only
//!   costs one poll interval.

mod locks;
mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::domain::{Task, TaskError, TaskId, TaskStatus};
use crate::pipeline::{Execution, ExecutionOptions, PipelineRegistry};
use crate::ports::{Commit, TaskStore};

use self::locks::ExecutionLocks;
pub use self::worker::WorkerGroup;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub step_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(1),
            step_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    #[serde(rename = "Not started")]
    NotStarted,
    Running,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::NotStarted => "Not started",
            SchedulerState::Running => "Running",
            SchedulerState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler needs at least one worker")]
    NoWorkers,
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    pipelines: Arc<PipelineRegistry>,
    config: SchedulerConfig,
    notify: Notify,
    handoff: Mutex<VecDeque<TaskId>>,
    locks: ExecutionLocks,
    active: AtomicUsize,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pipelines: Arc<PipelineRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            pipelines,
            config,
            notify: Notify::new(),
            handoff: Mutex::new(VecDeque::new()),
            locks: ExecutionLocks::default(),
            active: AtomicUsize::new(0),
            state: Mutex::new(SchedulerState::NotStarted),
        }
    }

    /// Spawns the worker pool.
    pub fn start(self: &Arc<Self>) -> Result<WorkerGroup, SchedulerError> {
        if self.config.workers == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        {
            let mut state = self.state.lock();
            if *state == SchedulerState::Running {
                return Err(SchedulerError::AlreadyRunning);
            }
            *state = SchedulerState::Running;
        }
        info!(workers = self.config.workers, "scheduler started");
        Ok(WorkerGroup::spawn(Arc::clone(self), self.config.workers))
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Tasks currently inside a step run.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Tells an idle worker there may be work.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Queues a task that is already `Running` (a retried step) ahead of
    /// queued work.
    pub fn hand_off(&self, id: TaskId) {
        self.handoff.lock().push_back(id);
        self.wake();
    }

    /// Drops bookkeeping for a task that left the store.
    pub fn forget(&self, id: TaskId) {
        self.handoff.lock().retain(|queued| *queued != id);
        self.locks.release(id);
    }

    /// Requeues tasks left `Running` by an unclean stop. Call before
    /// [`Scheduler::start`].
    pub async fn recover(&self) -> Result<usize, TaskError> {
        let mut recovered = 0;
        for task in self.store.list_by_status(TaskStatus::Running).await? {
            let result = self
                .store
                .update(task.id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                    t.recover()?;
                    Ok(Commit::Save)
                })
                .await;
            match result {
                Ok(_) => recovered += 1,
                Err(TaskError::NotFound(_) | TaskError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if recovered > 0 {
            info!(recovered, "requeued interrupted tasks");
            self.wake();
        }
        Ok(recovered)
    }

    /// Picks the next task for a worker, marking it `Running`.
    async fn try_claim(&self) -> Result<Option<TaskId>, TaskError> {
        loop {
            let next = self.handoff.lock().pop_front();
            let Some(id) = next else {
                break;
            };
            match self.store.get(id).await {
                Ok(task) if task.status == TaskStatus::Running => {
                    if !self.handoff.lock().is_empty() {
                        self.wake();
                    }
                    return Ok(Some(id));
                }
                // 削除済み・状態が変わったものは捨てる
                Ok(_) | Err(TaskError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let mut queued = self.store.list_by_status(TaskStatus::Queued).await?;
        queued.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));

        for (i, candidate) in queued.iter().enumerate() {
            let claimed = self
                .store
                .update(candidate.id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                    t.claim()?;
                    Ok(Commit::Save)
                })
                .await;
            match claimed {
                Ok(_) => {
                    // 残りがあれば別の worker も起こす
                    if i + 1 < queued.len() {
                        self.wake();
                    }
                    return Ok(Some(candidate.id));
                }
                // another worker got there first, or it was deleted
                Err(TaskError::NotFound(_) | TaskError::InvalidState { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn execute(&self, worker_id: usize, id: TaskId) {
        let guard = self.locks.acquire(id).await;
        self.active.fetch_add(1, Ordering::SeqCst);
        let outcome = self.run(id).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Execution::Completed => info!(worker_id, task_id = %id, "task completed"),
            Execution::Failed(failure) => warn!(
                worker_id,
                task_id = %id,
                kind = failure.error_kind().code(),
                error = %failure,
                "task failed"
            ),
            Execution::Cancelled => info!(worker_id, task_id = %id, "task deleted at step boundary"),
            Execution::Vanished => info!(worker_id, task_id = %id, "task removed while running"),
            Execution::Aborted(e) => {
                error!(worker_id, task_id = %id, error = %e, "task aborted");
                self.mark_internal_failure(id, &e).await;
            }
        }

        drop(guard);
        self.locks.release(id);
    }

    async fn run(&self, id: TaskId) -> Execution {
        let task = match self.store.get(id).await {
            Ok(task) => task,
            Err(TaskError::NotFound(_)) => return Execution::Vanished,
            Err(e) => return Execution::Aborted(e),
        };
        let Some(pipeline) = self.pipelines.get(&task.task_type) else {
            return Execution::Aborted(TaskError::Fatal(format!(
                "no pipeline registered for task type '{}'",
                task.task_type
            )));
        };
        let opts = ExecutionOptions {
            step_timeout: self.config.step_timeout,
        };
        pipeline.execute(self.store.as_ref(), id, &opts).await
    }

    async fn mark_internal_failure(&self, id: TaskId, cause: &TaskError) {
        let detail = cause.to_string();
        let result = self
            .store
            .update(id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                if t.delete_requested {
                    return Ok(Commit::Remove);
                }
                t.fail_internal(detail.clone());
                Ok(Commit::Save)
            })
            .await;
        match result {
            Ok(_) | Err(TaskError::NotFound(_)) => {}
            Err(e) => error!(task_id = %id, error = %e, "could not record internal failure"),
        }
    }
}
