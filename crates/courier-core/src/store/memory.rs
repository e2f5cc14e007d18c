//! In-memory task store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::domain::{Task, TaskError, TaskId, TaskSpec, TaskStatus};
use crate::ports::{Clock, Commit, IdGenerator, Mutation, SystemClock, TaskStore, UlidGenerator};

/// One task's cell. `None` means the task was deleted while someone still held
/// the handle.
type Slot = Arc<Mutex<Option<Task>>>;

/// In-memory store with per-task locking.
///
/// Locking:
/// - `index` maps IDs to slots; it is held only to insert, remove or clone
///   slot handles, never while a task is being mutated.
/// - each slot has its own mutex, held only for the synchronous mutation.
/// - order is always slot -> index (removal), never index -> slot.
///
/// どのロックも `.await` を跨がない。
pub struct InMemoryTaskStore {
    index: RwLock<HashMap<TaskId, Slot>>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    fn slot(&self, id: TaskId) -> Result<Slot, TaskError> {
        self.index
            .read()
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Puts back tasks read from a snapshot, replacing any with the same ID.
    pub(crate) fn restore(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut index = self.index.write();
        for task in tasks {
            index.insert(task.id, Arc::new(Mutex::new(Some(task))));
        }
    }

    /// Clones the tasks `keep` accepts; the test runs under each slot's lock so
    /// rejected tasks are never copied.
    fn collect(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        // Clone the handles first so the index lock is released before any
        // slot is touched.
        let slots: Vec<Slot> = self.index.read().values().cloned().collect();
        let mut tasks: Vec<Task> = slots
            .iter()
            .filter_map(|slot| slot.lock().as_ref().filter(|&t| keep(t)).cloned())
            .collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        tasks
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, spec: TaskSpec, steps: Vec<String>) -> Result<Task, TaskError> {
        if steps.is_empty() {
            return Err(TaskError::validation(format!(
                "task type '{}' has no steps",
                spec.task_type
            )));
        }
        let id = self.ids.generate_task_id();
        let task = Task::new(id, spec, steps, self.clock.now());
        self.index
            .write()
            .insert(id, Arc::new(Mutex::new(Some(task.clone()))));
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task, TaskError> {
        let slot = self.slot(id)?;
        let guard = slot.lock();
        guard.clone().ok_or(TaskError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.collect(|_| true))
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError> {
        Ok(self.collect(|t| t.status == status))
    }

    async fn update(&self, id: TaskId, mutation: Mutation<'_>) -> Result<Task, TaskError> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let current = guard.as_ref().ok_or(TaskError::NotFound(id))?;

        // Mutate a draft so a failed mutation leaves the stored task untouched.
        let mut draft = current.clone();
        match mutation(&mut draft)? {
            Commit::Save => {
                draft.updated_at = self.clock.now();
                *guard = Some(draft.clone());
                Ok(draft)
            }
            Commit::Remove => {
                *guard = None;
                self.index.write().remove(&id);
                Ok(draft)
            }
        }
    }

    async fn delete(&self, id: TaskId) -> Result<Task, TaskError> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let task = guard.take().ok_or(TaskError::NotFound(id))?;
        self.index.write().remove(&id);
        Ok(task)
    }
}
