//! TaskStore port - the registry of task records.
//!
//! The in-memory implementation lives in [`crate::store`]; this trait is the
//! seam for a database-backed one.

use async_trait::async_trait;

use crate::domain::{Task, TaskError, TaskId, TaskSpec, TaskStatus};

/// What to do with a task after a mutation succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Store the mutated task.
    Save,
    /// Drop the task from the store.
    Remove,
}

/// A mutation applied under the task's lock. Returning `Err` aborts it and
/// leaves the stored task unchanged.
pub type Mutation<'a> = &'a mut (dyn FnMut(&mut Task) -> Result<Commit, TaskError> + Send);

/// TaskStore は task の正本（source of truth）
///
/// # 設計原則
/// - Readers never observe a half-applied mutation.
/// - Locking is per task; unrelated tasks never contend.
/// - `list()` is cheap enough to serve a 1-2 s poll loop.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a `Queued` task at step 0.
    async fn create(&self, spec: TaskSpec, steps: Vec<String>) -> Result<Task, TaskError>;

    async fn get(&self, id: TaskId) -> Result<Task, TaskError>;

    /// Snapshot of every task, most recently updated first.
    async fn list(&self) -> Result<Vec<Task>, TaskError>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.list().await?;
        tasks.retain(|t| t.status == status);
        Ok(tasks)
    }

    /// Applies `mutation` atomically and returns the task as committed (or,
    /// for [`Commit::Remove`], as it was when removed).
    async fn update(&self, id: TaskId, mutation: Mutation<'_>) -> Result<Task, TaskError>;

    async fn delete(&self, id: TaskId) -> Result<Task, TaskError>;
}
