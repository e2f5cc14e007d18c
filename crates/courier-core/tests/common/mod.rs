//! Shared harness for the scheduler scenario tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{AcquireError, Notify, Semaphore};

use courier_core::pipeline::{Pipeline, PipelineRegistry, Step, StepContext, StepOutput};
use courier_core::ports::TaskStore;
use courier_core::{
    CommandGateway, InMemoryTaskStore, Scheduler, SchedulerConfig, StatusFeed, StepFailure, Task,
    TaskId, TaskSpec, WorkerGroup,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Fails the first `failures` calls, then succeeds.
#[derive(Default)]
pub struct Scripted {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for Scripted {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StepFailure::step(
                format!("{} failed", ctx.step),
                format!("{} failed on attempt {}", ctx.step, ctx.task.attempts),
            ));
        }
        Ok(StepOutput::default())
    }
}

/// Records `(task, step index)` and tracks how many runs overlap.
#[derive(Default)]
pub struct Recorder {
    pub current: AtomicUsize,
    pub max: AtomicUsize,
    pub log: Mutex<Vec<(TaskId, usize)>>,
    pub hold: Duration,
}

impl Recorder {
    pub fn holding(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            ..Self::default()
        })
    }
}

#[async_trait]
impl Step for Recorder {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push((ctx.task.id, ctx.index));
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(StepOutput::default())
    }
}

/// Blocks inside the step until released.
pub struct Gate {
    entered: Notify,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    pub async fn wait_entered(&self) {
        tokio::time::timeout(WAIT, self.entered.notified())
            .await
            .expect("step never started");
    }

    pub fn open(&self) {
        self.release.add_permits(1);
    }

    /// Signals entry, then waits for [`Gate::open`].
    pub async fn pass(&self) -> Result<(), AcquireError> {
        self.entered.notify_one();
        self.release.acquire().await?.forget();
        Ok(())
    }
}

#[async_trait]
impl Step for Gate {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        self.pass()
            .await
            .map_err(|e| StepFailure::step("gate closed", e.to_string()))?;
        Ok(StepOutput::default())
    }
}

pub struct Harness {
    pub store: Arc<dyn TaskStore>,
    pub scheduler: Arc<Scheduler>,
    pub gateway: CommandGateway,
    pub feed: StatusFeed,
}

impl Harness {
    pub fn new(workers: usize, pipelines: Vec<Pipeline>) -> Self {
        Self::with_store(Arc::new(InMemoryTaskStore::new()), workers, pipelines)
    }

    pub fn with_store(store: Arc<dyn TaskStore>, workers: usize, pipelines: Vec<Pipeline>) -> Self {
        let mut registry = PipelineRegistry::new();
        for pipeline in pipelines {
            registry.register(pipeline).expect("register pipeline");
        }
        let registry = Arc::new(registry);
        let config = SchedulerConfig {
            workers,
            poll_interval: Duration::from_millis(20),
            step_timeout: None,
        };
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), Arc::clone(&registry), config));
        let gateway = CommandGateway::new(Arc::clone(&store), registry, Arc::clone(&scheduler));
        let feed = StatusFeed::new(Arc::clone(&store));
        Self {
            store,
            scheduler,
            gateway,
            feed,
        }
    }

    pub fn start(&self) -> WorkerGroup {
        self.scheduler.start().expect("start scheduler")
    }

    pub async fn submit(&self, task_type: &str) -> Task {
        let spec = TaskSpec::new(task_type, "CT-1").with_destination("PACS");
        self.gateway.add_task(spec).await.expect("add task")
    }

    /// Polls the store until `pred` holds for the task.
    pub async fn wait_for(&self, id: TaskId, pred: impl Fn(&Task) -> bool) -> Task {
        let store = Arc::clone(&self.store);
        within(async move {
            loop {
                let task = store.get(id).await.expect("task exists");
                if pred(&task) {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }

    /// Polls until the task is gone from the store.
    pub async fn wait_gone(&self, id: TaskId) {
        let store = Arc::clone(&self.store);
        within(async move {
            while store.get(id).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }
}

pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut).await.expect("timed out")
}
