//! # Prometheus Dispatch
//!
//! Deduplicating priority queues and a supervised worker pool for scan
//! scheduling.
//!
//! A scheduler keeps one priority queue per organisation and task kind.
//! Worker pool managers on other machines poll it, run the tasks on
//! dedicated threads and report every status change back, so the scheduler
//! always knows where each unit of work is.
//!
//! ## Core Problem Solved
//!
//! Scan work is triggered from many places and often twice:
//!
//! - **Duplicate work**: the same plugin against the same target must not be
//!   queued twice; tasks are fingerprinted by content and deduplicated
//! - **Urgent work first**: lower priority values pop first, FIFO within a
//!   priority
//! - **Lost workers**: a worker that dies mid-task must not leave the task
//!   "running" forever; the manager fails it and starts a replacement
//! - **Restarts**: staged but unstarted tasks are handed back on shutdown,
//!   and the file store keeps queues across scheduler restarts
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_dispatch::core::{FieldHasher, QueueOptions, SchedulerService, Task};
//! use prometheus_dispatch::infra::InMemoryQueueStore;
//!
//! let scheduler = SchedulerService::new(Arc::new(InMemoryQueueStore::new()));
//! scheduler.register_queue(
//!     "acme",
//!     "boefje",
//!     QueueOptions { max_size: 1000, ..QueueOptions::default() },
//!     Arc::new(FieldHasher::new(["boefje__id", "input_ooi"])),
//! );
//! scheduler.push("boefje-acme", Task::new("boefje-acme", 3, payload))?;
//! ```
//!
//! ## Worker pool
//!
//! ```rust,ignore
//! use prometheus_dispatch::config::WorkerPoolConfig;
//! use prometheus_dispatch::core::WorkerPoolManager;
//! use prometheus_dispatch::runtime::{CommandHandler, HttpSchedulerClient};
//!
//! let config = WorkerPoolConfig::from_env()?;
//! let client = HttpSchedulerClient::new(&config.scheduler_api, config.request_timeout)?;
//! let manager = WorkerPoolManager::new(config, Arc::new(client), Arc::new(CommandHandler::from_env()?))?;
//! manager.run().await?;
//! ```
//!
//! For complete examples, see:
//! - `tests/priority_queue_test.rs` - Queue semantics
//! - `tests/worker_pool_test.rs` - Crash recovery and shutdown

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, priority queues, scheduler service and worker pool.
pub mod core;
/// Configuration models for the scheduler and worker pools.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Storage backends for queued tasks.
pub mod infra;
/// HTTP surface and process-level adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;
