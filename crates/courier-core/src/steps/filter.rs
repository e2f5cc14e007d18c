use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::StepFailure;
use crate::pipeline::{Step, StepContext, StepOutput};
use crate::ports::FilterService;

/// Runs the post-filter over the retrieved images.
pub struct FilterStep {
    service: Arc<dyn FilterService>,
}

impl FilterStep {
    pub fn new(service: Arc<dyn FilterService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Step for FilterStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        if ctx.task.received_images == 0 {
            return Err(StepFailure::step(
                "nothing to filter",
                format!("task {} has no retrieved images", ctx.task.id),
            ));
        }
        self.service.filter(&ctx.task).await?;
        Ok(StepOutput::default())
    }
}
