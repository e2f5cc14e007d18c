//! Status feed - polling clients の読み取り専用ビュー
//!
//! Everything here is built from store snapshots; nothing reads the live
//! execution state of a worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskError, TaskId, TaskStatus, TaskType};
use crate::ports::TaskStore;

const DATE_FORMAT: &str = "%d/%m/%Y";
const DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// One row of the task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub source: String,
    /// Destinations joined with `/`.
    pub destinations: String,
    pub patient_id: String,
    pub patient_name: String,
    /// `dd/mm/YYYY`, empty when unknown.
    pub study_date: String,
    pub description: String,
    /// `received/expected`; `received/?` while the expected count is unknown.
    pub imgs: String,
    pub started: String,
    pub updated: String,
    pub status: TaskStatus,
    pub status_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_full_msg: Option<String>,
    pub current_step: String,
    pub step_index: usize,
    pub step_count: usize,
    pub retryable: bool,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type.clone(),
            source: task.source.clone(),
            destinations: task.destinations.join("/"),
            patient_id: task.subject.patient_id.clone(),
            patient_name: task.subject.patient_name.clone(),
            study_date: task
                .subject
                .study_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            description: task.subject.series_description.clone(),
            imgs: format_images(task.received_images, task.subject.expected_images),
            started: format_time(task.started_at),
            updated: format_time(task.updated_at),
            status: task.status,
            status_msg: task.status_msg.clone(),
            status_full_msg: task.status_full_msg.clone(),
            current_step: task.current_step().unwrap_or_default().to_string(),
            step_index: task.current_step_index,
            step_count: task.steps.len(),
            retryable: task.retryable(),
        }
    }
}

fn format_images(received: u32, expected: u32) -> String {
    match expected {
        0 => format!("{received}/?"),
        n => format!("{received}/{n}"),
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

/// Task counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed
    }

    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct StatusFeed {
    store: Arc<dyn TaskStore>,
}

impl StatusFeed {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Visible tasks, most recently updated first.
    pub async fn snapshot(&self) -> Result<Vec<TaskView>, TaskError> {
        let tasks = self.store.list().await?;
        Ok(tasks.iter().filter(|t| t.visible).map(TaskView::from).collect())
    }

    /// Detail for one task, hidden ones included.
    pub async fn task(&self, id: TaskId) -> Result<TaskView, TaskError> {
        let task = self.store.get(id).await?;
        Ok(TaskView::from(&task))
    }

    /// Counts every task in the store, hidden ones included.
    pub async fn counts(&self) -> Result<StatusCounts, TaskError> {
        let mut counts = StatusCounts::default();
        for task in self.store.list().await? {
            counts.record(task.status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StepFailure, Subject, TaskSpec};
    use crate::ports::{Commit, FixedClock};
    use crate::store::InMemoryTaskStore;
    use chrono::{NaiveDate, TimeZone};
    use rstest::rstest;

    fn setup() -> (Arc<InMemoryTaskStore>, StatusFeed) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 5, 9).unwrap(),
        ));
        let store = Arc::new(InMemoryTaskStore::with_clock(clock));
        let feed = StatusFeed::new(store.clone());
        (store, feed)
    }

    fn spec() -> TaskSpec {
        TaskSpec::new("move", "CT-1")
            .with_destination("PACS")
            .with_destination("ARCHIVE")
            .with_subject(Subject {
                patient_id: "P-001".into(),
                patient_name: "DOE^JANE".into(),
                study_date: NaiveDate::from_ymd_opt(2023, 12, 24),
                series_description: "AX T1".into(),
                expected_images: 120,
                ..Subject::default()
            })
    }

    #[tokio::test]
    async fn view_formats_like_the_task_table() {
        let (store, feed) = setup();
        let task = store
            .create(spec(), vec!["retrieve".into(), "forward".into()])
            .await
            .unwrap();

        let view = feed.task(task.id).await.unwrap();

        assert_eq!(view.destinations, "PACS/ARCHIVE");
        assert_eq!(view.study_date, "24/12/2023");
        assert_eq!(view.imgs, "0/120");
        assert_eq!(view.started, "01/03/2024 08:05:09");
        assert_eq!(view.current_step, "retrieve");
        assert_eq!(view.step_count, 2);
        assert!(!view.retryable);
        assert!(view.status_full_msg.is_none());
    }

    #[tokio::test]
    async fn snapshot_skips_hidden_tasks_but_counts_them() {
        let (store, feed) = setup();
        let shown = store.create(spec(), vec!["retrieve".into()]).await.unwrap();
        store
            .create(spec().hidden(), vec!["retrieve".into()])
            .await
            .unwrap();

        let rows = feed.snapshot().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task_id, shown.id);

        let counts = feed.counts().await.unwrap();
        assert_eq!(counts.queued, 2);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn snapshot_reflects_committed_failure() {
        let (store, feed) = setup();
        let task = store.create(spec(), vec!["retrieve".into()]).await.unwrap();
        store
            .update(task.id, &mut |t: &mut Task| -> Result<Commit, TaskError> {
                t.claim()?;
                t.fail(&StepFailure::transient("CT-1 unreachable", "connection refused"));
                Ok(Commit::Save)
            })
            .await
            .unwrap();

        let rows = feed.snapshot().await.unwrap();
        assert_eq!(rows[0].status, TaskStatus::Failed);
        assert_eq!(rows[0].status_full_msg.as_deref(), Some("connection refused"));
        assert!(rows[0].retryable);
        assert_eq!(feed.counts().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (store, feed) = setup();
        let task = store.create(spec(), vec!["retrieve".into()]).await.unwrap();
        store.delete(task.id).await.unwrap();

        assert_eq!(feed.task(task.id).await, Err(TaskError::NotFound(task.id)));
    }

    #[rstest]
    #[case(0, 120, "0/120")]
    #[case(37, 120, "37/120")]
    #[case(100, 0, "100/?")]
    #[case(0, 0, "0/?")]
    fn image_column(#[case] received: u32, #[case] expected: u32, #[case] shown: &str) {
        assert_eq!(format_images(received, expected), shown);
    }

    #[test]
    fn view_serializes_with_table_field_names() {
        let task = Task::new(
            TaskId::from_ulid(ulid::Ulid::new()),
            spec(),
            vec!["retrieve".into()],
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 5, 9).unwrap(),
        );
        let json = serde_json::to_value(TaskView::from(&task)).unwrap();

        assert_eq!(json["status"], "queued");
        assert_eq!(json["imgs"], "0/120");
        assert!(json["task_id"].as_str().unwrap().starts_with("task-"));
        assert!(json.get("status_full_msg").is_none());
    }
}
