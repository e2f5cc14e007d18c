//! courier-server
//!
//! HTTP front end for courier-core: configuration, logging, the axum router
//! and simulated DICOM collaborators.

pub mod config;
pub mod http;
pub mod logging;
pub mod simulation;

use std::sync::Arc;

use courier_core::pipeline::RegistryError;
use courier_core::ports::TaskStore;
use courier_core::steps::dicom_pipelines;
use courier_core::{FileTaskStore, InMemoryTaskStore, Scheduler, TaskError};
use thiserror::Error;
use tracing::warn;

use crate::config::ServerConfig;
use crate::http::AppState;
use crate::simulation::simulated_services;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to register pipelines: {0}")]
    Pipelines(#[from] RegistryError),

    #[error("failed to open task store: {0}")]
    Store(#[from] TaskError),
}

/// Everything `main` needs, wired from the config.
pub struct App {
    pub state: AppState,
    pub scheduler: Arc<Scheduler>,
}

impl App {
    /// Opens the task store (loading saved tasks when `[store] path` is set)
    /// and wires pipelines, scheduler and HTTP state around it.
    pub async fn build(config: &ServerConfig) -> Result<Self, BuildError> {
        let services = simulated_services(&config.simulation, &config.devices);
        let pipelines = Arc::new(dicom_pipelines(&services)?);
        let store: Arc<dyn TaskStore> = match &config.store.path {
            Some(path) => Arc::new(FileTaskStore::open(path).await?),
            None => {
                warn!("no [store] path configured; tasks will not survive a restart");
                Arc::new(InMemoryTaskStore::new())
            }
        };
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&pipelines),
            config.scheduler_config(),
        ));
        let state = AppState::new(store, pipelines, Arc::clone(&scheduler));
        Ok(Self { state, scheduler })
    }
}
