//! Task model, priority queues, scheduler service and worker pool.

pub mod audit;
pub mod client;
pub mod error;
pub mod filter;
pub mod handler;
pub mod hasher;
pub mod priority_queue;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod worker_pool;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use client::{ClientError, SchedulerClient};
pub use error::{AppResult, SchedulerError};
pub use filter::{Filter, FilterOperator, FilterRequest};
pub use handler::TaskHandler;
pub use hasher::{FieldHasher, TaskHasher};
pub use priority_queue::{PriorityQueue, QueueOptions, QueueSnapshot};
pub use scheduler::{queue_id_for, QueueSummary, SchedulerService};
pub use store::QueueStore;
pub use task::{Task, TaskStatus};
pub use worker_pool::{DispatchQueue, PoolError, PoolStats, ShutdownHandle, WorkerId, WorkerPoolManager};
