use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::StepFailure;
use crate::pipeline::{Step, StepContext, StepOutput};
use crate::ports::{DeviceDirectory, RetrieveService};

/// Pulls the task's series from its source device.
///
/// When the subject announces an image count, receiving fewer images is a
/// failure; a count of 0 means "unknown" and accepts whatever arrives.
pub struct RetrieveStep {
    directory: Arc<dyn DeviceDirectory>,
    service: Arc<dyn RetrieveService>,
}

impl RetrieveStep {
    pub fn new(directory: Arc<dyn DeviceDirectory>, service: Arc<dyn RetrieveService>) -> Self {
        Self { directory, service }
    }
}

#[async_trait]
impl Step for RetrieveStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        let task = &ctx.task;
        let source = self
            .directory
            .resolve(&task.source)
            .await
            .map_err(|f| f.with_context(format!("source {}", task.source)))?;

        let received = self
            .service
            .retrieve(&source, &task.subject)
            .await
            .map_err(|f| f.with_context(format!("retrieve from {source}")))?;

        let expected = task.subject.expected_images;
        if expected > 0 && received < expected {
            return Err(StepFailure::step(
                format!("received {received}/{expected} images"),
                format!(
                    "retrieve from {source} ended early: {received} of {expected} images for study {}",
                    task.subject.study_instance_uid
                ),
            ));
        }
        Ok(StepOutput::received(received))
    }
}
