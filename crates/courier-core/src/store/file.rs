//! File-backed task store.
//!
//! Tasks live in an [`InMemoryTaskStore`]; every committed write is followed by
//! a JSON snapshot of the whole store, written to `<path>.tmp` and renamed over
//! `<path>`. A reader of the file therefore sees either the previous snapshot
//! or the new one, never a torn write.
//!
//! 再起動時は `open` がスナップショットを読み戻す。`Running` のまま残った task は
//! `Scheduler::recover` が queue に戻す。

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::InMemoryTaskStore;
use crate::domain::{Task, TaskError, TaskId, TaskSpec, TaskStatus};
use crate::ports::{Clock, Mutation, SystemClock, TaskStore};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    tasks: Vec<Task>,
}

pub struct FileTaskStore {
    tasks: InMemoryTaskStore,
    path: PathBuf,
    /// Held while a snapshot is taken and written, so a newer snapshot is
    /// never overwritten by an older one.
    writer: tokio::sync::Mutex<()>,
}

impl FileTaskStore {
    /// Opens the store at `path`, loading the snapshot if one exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TaskError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TaskError> {
        let path = path.into();
        let tasks = InMemoryTaskStore::with_clock(clock);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    TaskError::Storage(format!("failed to parse {}: {e}", path.display()))
                })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(TaskError::Storage(format!(
                        "{} has snapshot version {}, expected {SNAPSHOT_VERSION}",
                        path.display(),
                        snapshot.version
                    )));
                }
                tasks.restore(snapshot.tasks);
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => {
                return Err(TaskError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        }

        info!(path = %path.display(), tasks = tasks.len(), "task store opened");
        Ok(Self {
            tasks,
            path,
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Writes the current contents to disk.
    async fn persist(&self) -> Result<(), TaskError> {
        let _writer = self.writer.lock().await;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            tasks: self.tasks.list().await?,
        };
        let result = self.write_atomic(&snapshot).await;
        if let Err(e) = &result {
            error!(path = %self.path.display(), error = %e, "task snapshot not written");
        }
        result
    }

    async fn write_atomic(&self, snapshot: &Snapshot) -> Result<(), TaskError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| TaskError::Storage(format!("failed to serialize tasks: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        let io_err = |what: &str, path: &Path, e: std::io::Error| {
            TaskError::Storage(format!("failed to {what} {}: {e}", path.display()))
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create directory", parent, e))?;
        }

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_err("create", &tmp_path, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| io_err("write", &tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_err("sync", &tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| io_err("replace", &self.path, e))?;
        Ok(())
    }
}

/// Writes return only after the snapshot holding them is on disk. If the
/// write fails the caller gets `Storage`; the change stays in memory and goes
/// out with the next successful snapshot.
#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, spec: TaskSpec, steps: Vec<String>) -> Result<Task, TaskError> {
        let task = self.tasks.create(spec, steps).await?;
        self.persist().await?;
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task, TaskError> {
        self.tasks.get(id).await
    }

    async fn list(&self) -> Result<Vec<Task>, TaskError> {
        self.tasks.list().await
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError> {
        self.tasks.list_by_status(status).await
    }

    async fn update(&self, id: TaskId, mutation: Mutation<'_>) -> Result<Task, TaskError> {
        let task = self.tasks.update(id, mutation).await?;
        self.persist().await?;
        Ok(task)
    }

    async fn delete(&self, id: TaskId) -> Result<Task, TaskError> {
        let task = self.tasks.delete(id).await?;
        self.persist().await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Commit;
    use tempfile::TempDir;

    fn spec() -> TaskSpec {
        TaskSpec::new("move", "CT-1").with_destination("PACS")
    }

    fn steps() -> Vec<String> {
        vec!["retrieve".to_string(), "forward".to_string()]
    }

    fn claim_and_advance(t: &mut Task) -> Result<Commit, TaskError> {
        t.claim()?;
        t.complete_step()?;
        Ok(Commit::Save)
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileTaskStore::open(dir.path().join("tasks.json")).await.unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn committed_writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("tasks.json");

        let (kept, removed) = {
            let store = FileTaskStore::open(&path).await.unwrap();
            let kept = store.create(spec(), steps()).await.unwrap();
            let removed = store.create(spec(), steps()).await.unwrap();
            store.update(kept.id, &mut claim_and_advance).await.unwrap();
            store.delete(removed.id).await.unwrap();
            (store.get(kept.id).await.unwrap(), removed)
        };

        let reopened = FileTaskStore::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(kept.id).await.unwrap(), kept);
        assert_eq!(
            reopened.get(removed.id).await,
            Err(TaskError::NotFound(removed.id))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn rejected_mutation_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let store = FileTaskStore::open(&path).await.unwrap();
        let task = store.create(spec(), steps()).await.unwrap();
        let before = tokio::fs::read(&path).await.unwrap();

        let err = store
            .update(task.id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                t.restart()?;
                Ok(Commit::Save)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::InvalidState { .. }));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = FileTaskStore::open(&path).await.err().unwrap();
        assert!(matches!(err, TaskError::Storage(_)));
    }

    #[tokio::test]
    async fn unknown_snapshot_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        tokio::fs::write(&path, br#"{"version": 99, "tasks": []}"#)
            .await
            .unwrap();

        let err = FileTaskStore::open(&path).await.err().unwrap();
        assert!(err.to_string().contains("version 99"));
    }
}
