//! HTTP surface (axum).

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use courier_core::ports::TaskStore;
use courier_core::{CommandGateway, PipelineRegistry, Scheduler, StatusFeed};

pub use self::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub gateway: CommandGateway,
    pub feed: StatusFeed,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TaskStore>,
        pipelines: Arc<PipelineRegistry>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            gateway: CommandGateway::new(Arc::clone(&store), pipelines, Arc::clone(&scheduler)),
            feed: StatusFeed::new(store),
            scheduler,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get_tasks_table", get(handlers::get_tasks_table))
        .route("/get_task/:task_id", get(handlers::get_task))
        .route("/manage_tasks", post(handlers::manage_tasks))
        .route("/task_action", post(handlers::task_action))
        .route("/scheduler_status", get(handlers::scheduler_status))
        .with_state(state)
}
