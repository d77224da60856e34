//! Storage backends for queued tasks.

pub mod store;

pub use store::{FileQueueStore, InMemoryQueueStore};
