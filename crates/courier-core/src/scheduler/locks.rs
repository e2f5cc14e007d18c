use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::TaskId;

/// Per-task execution locks: at most one worker runs a given task at a time.
///
/// The map itself is behind a sync mutex held only to look up or insert the
/// entry; waiting happens on the task's own async mutex.
#[derive(Debug, Default)]
pub(crate) struct ExecutionLocks {
    entries: Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
}

impl ExecutionLocks {
    pub(crate) async fn acquire(&self, id: TaskId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(id).or_default())
        };
        entry.lock_owned().await
    }

    /// Drops the entry if nobody holds or waits on it.
    pub(crate) fn release(&self, id: TaskId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&id)
            && Arc::strong_count(entry) == 1
        {
            entries.remove(&id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ulid::Ulid;

    #[tokio::test]
    async fn second_acquire_waits_for_first() {
        let locks = Arc::new(ExecutionLocks::default());
        let id = TaskId::from_ulid(Ulid::new());

        let first = locks.acquire(id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn release_keeps_held_entries() {
        let locks = ExecutionLocks::default();
        let id = TaskId::from_ulid(Ulid::new());

        let guard = locks.acquire(id).await;
        locks.release(id);
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.release(id);
        assert_eq!(locks.len(), 0);
    }
}
