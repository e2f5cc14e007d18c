//! DICOM collaborator ports.
//!
//! The network transport (association negotiation, C-MOVE, C-STORE) and the
//! post-filter live outside this crate. The built-in steps in
//! [`crate::steps`] only talk to these traits, and every failure comes back as
//! a [`StepFailure`] so it lands on the task instead of unwinding the worker.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{StepFailure, Subject, Task};

/// A remote DICOM application entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub ae_title: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}@{}:{})", self.name, self.ae_title, self.host, self.port)
    }
}

/// Resolves device names used in task specs.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Device, StepFailure>;
}

/// Pulls a series from a source device (C-MOVE to us).
#[async_trait]
pub trait RetrieveService: Send + Sync {
    /// Returns the number of images received.
    async fn retrieve(&self, source: &Device, subject: &Subject) -> Result<u32, StepFailure>;
}

/// Post-filters the images of a task.
#[async_trait]
pub trait FilterService: Send + Sync {
    async fn filter(&self, task: &Task) -> Result<(), StepFailure>;
}

/// Sends the images of a task to one destination (C-STORE).
#[async_trait]
pub trait ForwardService: Send + Sync {
    async fn forward(&self, destination: &Device, task: &Task) -> Result<(), StepFailure>;
}
