use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::StepFailure;
use crate::pipeline::{Step, StepContext, StepOutput};
use crate::ports::{DeviceDirectory, ForwardService};

/// Sends the images to every destination, in order. Stops at the first
/// destination that fails; a retry sends to all of them again.
pub struct ForwardStep {
    directory: Arc<dyn DeviceDirectory>,
    service: Arc<dyn ForwardService>,
}

impl ForwardStep {
    pub fn new(directory: Arc<dyn DeviceDirectory>, service: Arc<dyn ForwardService>) -> Self {
        Self { directory, service }
    }
}

#[async_trait]
impl Step for ForwardStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepFailure> {
        let task = &ctx.task;
        for name in &task.destinations {
            let destination = self
                .directory
                .resolve(name)
                .await
                .map_err(|f| f.with_context(format!("destination {name}")))?;
            self.service
                .forward(&destination, task)
                .await
                .map_err(|f| f.with_context(format!("forward to {destination}")))?;
            debug!(task_id = %task.id, destination = %name, "forwarded");
        }
        Ok(StepOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, Task, TaskId, TaskSpec};
    use crate::steps::testing::{Directory, Forward};
    use chrono::Utc;
    use ulid::Ulid;

    fn ctx(destinations: &[&str]) -> StepContext {
        let mut spec = TaskSpec::new("move", "CT-1");
        for d in destinations {
            spec = spec.with_destination(*d);
        }
        let task = Task::new(
            TaskId::from_ulid(Ulid::new()),
            spec,
            vec!["retrieve".into(), "forward".into()],
            Utc::now(),
        );
        StepContext {
            task,
            step: "forward".into(),
            index: 1,
        }
    }

    #[tokio::test]
    async fn forwards_to_every_destination_in_order() {
        let forward = Arc::new(Forward::default());
        let step = ForwardStep::new(
            Arc::new(Directory::with(&["PACS", "ARCHIVE", "WS"])),
            forward.clone(),
        );

        step.run(&ctx(&["WS", "PACS", "ARCHIVE"])).await.unwrap();

        assert_eq!(*forward.sent.lock(), vec!["WS", "PACS", "ARCHIVE"]);
    }

    #[tokio::test]
    async fn stops_at_first_unreachable_destination() {
        let forward = Arc::new(Forward {
            refuse: vec!["ARCHIVE".into()],
            ..Forward::default()
        });
        let step = ForwardStep::new(
            Arc::new(Directory::with(&["PACS", "ARCHIVE", "WS"])),
            forward.clone(),
        );

        let failure = step.run(&ctx(&["PACS", "ARCHIVE", "WS"])).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::TransientIo);
        assert_eq!(failure.message, "ARCHIVE unreachable");
        assert!(failure.detail.starts_with("forward to ARCHIVE"));
        assert_eq!(*forward.sent.lock(), vec!["PACS"]);
    }
}
