//! Simulated DICOM collaborators.
//!
//! The server has no DICOM stack of its own; these stand-ins let the scheduler,
//! the feed and the HTTP surface run end to end. Latency, random failures and
//! dead devices are driven by `[simulation]` in the config.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::domain::{StepFailure, Subject, Task};
use courier_core::ports::{Device, DeviceDirectory, FilterService, ForwardService, RetrieveService};
use courier_core::steps::DicomServices;
use tracing::debug;

use crate::config::SimulationSection;

/// Device lookup over the configured device list.
pub struct StaticDeviceDirectory {
    devices: HashMap<String, Device>,
}

impl StaticDeviceDirectory {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }
}

#[async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn resolve(&self, name: &str) -> Result<Device, StepFailure> {
        self.devices.get(name).cloned().ok_or_else(|| {
            StepFailure::step(
                format!("unknown device {name}"),
                format!("device '{name}' is not configured"),
            )
        })
    }
}

/// Shared behaviour of the simulated services.
#[derive(Debug, Clone)]
struct Network {
    latency: Duration,
    failure_rate: f64,
    unreachable: HashSet<String>,
}

impl Network {
    fn new(config: &SimulationSection) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            failure_rate: config.failure_rate,
            unreachable: config.unreachable.iter().cloned().collect(),
        }
    }

    /// Waits out the latency, then fails if the device is dead or the dice say so.
    async fn exchange(&self, device: &Device, operation: &str) -> Result<(), StepFailure> {
        tokio::time::sleep(self.latency).await;
        if self.unreachable.contains(&device.name) {
            return Err(StepFailure::transient(
                format!("{} unreachable", device.name),
                format!("{operation}: association with {device} was refused"),
            ));
        }
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            return Err(StepFailure::transient(
                format!("{operation} to {} failed", device.name),
                format!("{operation}: connection to {device} reset (injected)"),
            ));
        }
        Ok(())
    }
}

pub struct SimulatedRetrieve {
    network: Network,
    default_images: u32,
}

#[async_trait]
impl RetrieveService for SimulatedRetrieve {
    async fn retrieve(&self, source: &Device, subject: &Subject) -> Result<u32, StepFailure> {
        self.network.exchange(source, "C-MOVE").await?;
        let images = match subject.expected_images {
            0 => self.default_images,
            n => n,
        };
        debug!(source = %source.name, images, "simulated retrieve");
        Ok(images)
    }
}

pub struct SimulatedFilter {
    latency: Duration,
}

#[async_trait]
impl FilterService for SimulatedFilter {
    async fn filter(&self, task: &Task) -> Result<(), StepFailure> {
        tokio::time::sleep(self.latency).await;
        debug!(task_id = %task.id, images = task.received_images, "simulated filter");
        Ok(())
    }
}

pub struct SimulatedForward {
    network: Network,
}

#[async_trait]
impl ForwardService for SimulatedForward {
    async fn forward(&self, destination: &Device, task: &Task) -> Result<(), StepFailure> {
        self.network.exchange(destination, "C-STORE").await?;
        debug!(task_id = %task.id, destination = %destination.name, "simulated forward");
        Ok(())
    }
}

/// Wires the simulated collaborators for the built-in steps.
pub fn simulated_services(config: &SimulationSection, devices: &[Device]) -> DicomServices {
    let network = Network::new(config);
    DicomServices {
        directory: Arc::new(StaticDeviceDirectory::new(devices.iter().cloned())),
        retrieve: Arc::new(SimulatedRetrieve {
            network: network.clone(),
            default_images: config.default_images,
        }),
        filter: Arc::new(SimulatedFilter {
            latency: network.latency,
        }),
        forward: Arc::new(SimulatedForward { network }),
    }
}
