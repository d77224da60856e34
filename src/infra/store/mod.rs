//! Queue store backends.

pub mod file;
pub mod memory;

pub use file::FileQueueStore;
pub use memory::InMemoryQueueStore;
