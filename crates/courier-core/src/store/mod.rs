//! Task store implementations.

mod file;
mod memory;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;
