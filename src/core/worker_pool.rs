//! Worker pool manager pulling tasks from the scheduler.
//!
//! The manager runs a fixed number of dedicated OS worker threads, each with
//! its own single-threaded tokio runtime. A polling loop pops tasks from the
//! scheduler into a small local dispatch queue; idle workers take from it,
//! report `RUNNING`, run the [`TaskHandler`](crate::core::TaskHandler) and
//! report the outcome. A supervision loop replaces dead workers and fails
//! the tasks they were holding.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_dispatch::config::WorkerPoolConfig;
//! use prometheus_dispatch::core::WorkerPoolManager;
//!
//! let manager = WorkerPoolManager::new(
//!     WorkerPoolConfig::new().with_pool_size(4).with_queue_kind("boefje"),
//!     client,   // Arc<dyn SchedulerClient>
//!     handler,  // Arc<dyn TaskHandler>
//! )?;
//! let shutdown = manager.shutdown_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.trigger();
//! });
//! manager.run().await?;
//! ```

mod dispatch;
mod manager;
mod worker;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::client::ClientError;

pub use dispatch::DispatchQueue;
pub use manager::WorkerPoolManager;

/// Errors that stop a worker pool manager.
#[derive(Debug)]
pub enum PoolError {
    /// The local dispatch queue is full; no more tasks can be staged.
    QueueFull,

    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Scheduler call failed where the manager cannot continue.
    Client(ClientError),

    /// Internal error (thread spawn failure, join failure, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "dispatch queue is full"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Client(err) => write!(f, "scheduler client error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ClientError> for PoolError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

/// Identity of one worker incarnation: its slot and how many times the slot
/// was (re)started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId {
    /// Position in the pool, stable across restarts.
    pub slot: usize,
    /// Incremented on every replacement.
    pub generation: u64,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}.{}", self.slot, self.generation)
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker slots.
    pub worker_count: usize,

    /// Tasks staged locally, not yet taken by a worker.
    pub staged_tasks: usize,

    /// Tasks currently owned by a worker.
    pub active_tasks: usize,

    /// Tasks popped from the scheduler.
    pub polled_tasks: u64,

    /// Tasks finished as completed.
    pub completed_tasks: u64,

    /// Tasks finished as failed, including crash recovery.
    pub failed_tasks: u64,

    /// Workers replaced after dying.
    pub restarted_workers: u64,

    /// Staged tasks pushed back to the scheduler at shutdown.
    pub handed_back_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub polled_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub restarted_workers: AtomicU64,
    pub handed_back_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, staged_tasks: usize, active_tasks: usize) -> PoolStats {
        PoolStats {
            worker_count,
            staged_tasks,
            active_tasks,
            polled_tasks: self.polled_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            restarted_workers: self.restarted_workers.load(Ordering::Relaxed),
            handed_back_tasks: self.handed_back_tasks.load(Ordering::Relaxed),
        }
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Requests a graceful stop of a running manager.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask the manager to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::QueueFull.to_string(), "dispatch queue is full");
        assert_eq!(
            PoolError::InvalidConfig("pool_size must be greater than 0".into()).to_string(),
            "invalid configuration: pool_size must be greater than 0"
        );
        let err = PoolError::from(ClientError::Transport("connection refused".into()));
        assert_eq!(
            err.to_string(),
            "scheduler client error: transport error: connection refused"
        );
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        PoolCounters::bump(&counters.polled_tasks);
        PoolCounters::bump(&counters.polled_tasks);
        PoolCounters::bump(&counters.completed_tasks);

        let stats = counters.snapshot(4, 2, 1);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.staged_tasks, 2);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.polled_tasks, 2);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.failed_tasks, 0);
    }

    #[test]
    fn test_shutdown_handle_is_shared() {
        let handle = ShutdownHandle::new();
        let clone = handle.clone();
        let rx = handle.subscribe();
        assert!(!handle.is_triggered());
        clone.trigger();
        assert!(handle.is_triggered());
        assert!(*rx.borrow());
    }

    #[test]
    fn test_worker_id_display() {
        let id = WorkerId { slot: 2, generation: 5 };
        assert_eq!(id.to_string(), "worker-2.5");
    }
}
