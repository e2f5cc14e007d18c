//! Built-in DICOM steps and the standard pipelines.
//!
//! | task type     | steps                       |
//! |---------------|-----------------------------|
//! | `retrieve`    | retrieve                    |
//! | `move`        | retrieve, forward           |
//! | `post_filter` | retrieve, filter, forward   |

mod filter;
mod forward;
mod retrieve;

use std::sync::Arc;

use crate::pipeline::{Pipeline, PipelineRegistry, RegistryError, Step};
use crate::ports::{DeviceDirectory, FilterService, ForwardService, RetrieveService};

pub use self::filter::FilterStep;
pub use self::forward::ForwardStep;
pub use self::retrieve::RetrieveStep;

pub const RETRIEVE: &str = "retrieve";
pub const FILTER: &str = "filter";
pub const FORWARD: &str = "forward";

pub const TASK_RETRIEVE: &str = "retrieve";
pub const TASK_MOVE: &str = "move";
pub const TASK_POST_FILTER: &str = "post_filter";

/// The collaborators the built-in steps talk to.
#[derive(Clone)]
pub struct DicomServices {
    pub directory: Arc<dyn DeviceDirectory>,
    pub retrieve: Arc<dyn RetrieveService>,
    pub filter: Arc<dyn FilterService>,
    pub forward: Arc<dyn ForwardService>,
}

/// Registry holding the `retrieve`, `move` and `post_filter` pipelines.
pub fn dicom_pipelines(services: &DicomServices) -> Result<PipelineRegistry, RegistryError> {
    let retrieve: Arc<dyn Step> = Arc::new(RetrieveStep::new(
        Arc::clone(&services.directory),
        Arc::clone(&services.retrieve),
    ));
    let filter: Arc<dyn Step> = Arc::new(FilterStep::new(Arc::clone(&services.filter)));
    let forward: Arc<dyn Step> = Arc::new(ForwardStep::new(
        Arc::clone(&services.directory),
        Arc::clone(&services.forward),
    ));

    let mut registry = PipelineRegistry::new();
    registry.register(Pipeline::new(TASK_RETRIEVE).shared_step(RETRIEVE, Arc::clone(&retrieve)))?;
    registry.register(
        Pipeline::new(TASK_MOVE)
            .shared_step(RETRIEVE, Arc::clone(&retrieve))
            .shared_step(FORWARD, Arc::clone(&forward)),
    )?;
    registry.register(
        Pipeline::new(TASK_POST_FILTER)
            .shared_step(RETRIEVE, retrieve)
            .shared_step(FILTER, filter)
            .shared_step(FORWARD, forward),
    )?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable collaborators for the step tests.

    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::domain::{StepFailure, Subject, Task};
    use crate::ports::{Device, DeviceDirectory, FilterService, ForwardService, RetrieveService};

    #[derive(Default)]
    pub struct Directory {
        pub devices: HashMap<String, Device>,
    }

    impl Directory {
        pub fn with(names: &[&str]) -> Self {
            let devices = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let device = Device {
                        name: name.to_string(),
                        ae_title: name.to_uppercase(),
                        host: "127.0.0.1".into(),
                        port: 11112 + i as u16,
                    };
                    (name.to_string(), device)
                })
                .collect();
            Self { devices }
        }
    }

    #[async_trait]
    impl DeviceDirectory for Directory {
        async fn resolve(&self, name: &str) -> Result<Device, StepFailure> {
            self.devices.get(name).cloned().ok_or_else(|| {
                StepFailure::step(format!("unknown device {name}"), "not in directory")
            })
        }
    }

    pub struct Retrieve {
        pub images: u32,
    }

    #[async_trait]
    impl RetrieveService for Retrieve {
        async fn retrieve(&self, _source: &Device, _subject: &Subject) -> Result<u32, StepFailure> {
            Ok(self.images)
        }
    }

    pub struct Filter {
        pub fail: bool,
    }

    #[async_trait]
    impl FilterService for Filter {
        async fn filter(&self, _task: &Task) -> Result<(), StepFailure> {
            if self.fail {
                Err(StepFailure::step("filter failed", "no series matched"))
            } else {
                Ok(())
            }
        }
    }

    /// Records each destination it is called with; refuses the ones listed.
    #[derive(Default)]
    pub struct Forward {
        pub refuse: Vec<String>,
        pub sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ForwardService for Forward {
        async fn forward(&self, destination: &Device, _task: &Task) -> Result<(), StepFailure> {
            if self.refuse.contains(&destination.name) {
                return Err(StepFailure::transient(
                    format!("{} unreachable", destination.name),
                    "association rejected",
                ));
            }
            self.sent.lock().push(destination.name.clone());
            Ok(())
        }
    }
}
