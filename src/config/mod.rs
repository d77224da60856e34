//! Configuration models for the scheduler, its queues and worker pools.

pub mod queue;
pub mod worker;

pub use queue::{QueueConfig, SchedulerConfig, StoreBackendConfig};
pub use worker::WorkerPoolConfig;
