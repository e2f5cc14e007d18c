//! Domain model (IDs, specs, task records, status, errors).

pub mod errors;
pub mod ids;
pub mod spec;
pub mod state;
pub mod task;
pub mod task_type;

pub use errors::{ErrorKind, FailureKind, StepFailure, TaskError};
pub use ids::{ParseIdError, TaskId};
pub use spec::{Subject, TaskSpec};
pub use state::TaskStatus;
pub use task::{StepProgress, Task};
pub use task_type::TaskType;
