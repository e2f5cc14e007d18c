//! Ports - 抽象化レイヤー
//!
//! Each trait here is a seam to something outside the orchestration core:
//! task persistence, time, ID generation and the DICOM collaborators.

pub mod clock;
pub mod dicom;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dicom::{Device, DeviceDirectory, FilterService, ForwardService, RetrieveService};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{Commit, Mutation, TaskStore};
