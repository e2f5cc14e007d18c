//! courier-core
//!
//! Task orchestration for DICOM transfers: a task store, step pipelines, a
//! bounded worker pool, a read-only status feed and a command gateway.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task_type, spec, task, state, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, Clock, IdGenerator, DICOM collaborators）
//! - **store**: InMemoryTaskStore と FileTaskStore（JSON snapshot）
//! - **pipeline**: Step trait, Pipeline, PipelineRegistry
//! - **scheduler**: worker pool と retry hand-off
//! - **feed**: polling 用の TaskView / StatusCounts
//! - **gateway**: delete / restart / retry などのコマンド
//! - **steps**: retrieve / filter / forward と標準 pipeline

pub mod domain;
pub mod feed;
pub mod gateway;
pub mod pipeline;
pub mod ports;
pub mod scheduler;
pub mod steps;
pub mod store;

pub use domain::{ErrorKind, StepFailure, Task, TaskError, TaskId, TaskSpec, TaskStatus, TaskType};
pub use feed::{StatusCounts, StatusFeed, TaskView};
pub use gateway::{BulkReport, CommandGateway, CommandReceipt, TaskAction};
pub use pipeline::{Pipeline, PipelineRegistry, Step, StepContext, StepOutput};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState, WorkerGroup};
pub use store::{FileTaskStore, InMemoryTaskStore};
