//! Persistence contract for queued tasks.

use std::cmp::Ordering;

use uuid::Uuid;

use super::error::SchedulerError;
use super::filter::FilterRequest;
use super::task::Task;

/// Durable storage behind one or more priority queues.
///
/// Every operation is scoped by `queue_id` and atomic per call. The store keeps
/// the historical record of every task: popping or finishing a task changes its
/// status but leaves it stored; only `remove` and `clear` delete.
pub trait QueueStore: Send + Sync {
    /// Persist a new task record.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` if the id is already stored or the
    /// write fails.
    fn push(&self, task: Task) -> Result<Task, SchedulerError>;

    /// Mark the next eligible `QUEUED` task as `DISPATCHED` and return it.
    ///
    /// Eligible tasks match `filters`; the next one has the lowest priority
    /// value, then the oldest `created_at`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidFilter` if the filters cannot be evaluated.
    fn pop(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Option<Task>, SchedulerError>;

    /// Look at the `index`-th task in pop order without changing anything.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn peek(&self, queue_id: &str, index: usize) -> Result<Option<Task>, SchedulerError>;

    /// Replace the stored record carrying `task.id` in `task.queue_id`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TaskNotFound` if no such record exists.
    fn update(&self, task: &Task) -> Result<(), SchedulerError>;

    /// Delete a record, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn remove(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError>;

    /// Most recently created non-terminal record with this hash.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_by_hash(&self, queue_id: &str, hash: &str) -> Result<Option<Task>, SchedulerError>;

    /// Record with this id, in any status.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_by_id(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError>;

    /// All records of the queue matching `filters`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidFilter` if the filters cannot be evaluated.
    fn list(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Vec<Task>, SchedulerError>;

    /// Number of `QUEUED` tasks.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn size(&self, queue_id: &str) -> Result<usize, SchedulerError>;

    /// Whether no task is `QUEUED`.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn empty(&self, queue_id: &str) -> Result<bool, SchedulerError> {
        Ok(self.size(queue_id)? == 0)
    }

    /// Delete every record of the queue.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn clear(&self, queue_id: &str) -> Result<(), SchedulerError>;

    /// Queues holding at least one record.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn queue_ids(&self) -> Result<Vec<String>, SchedulerError>;
}

/// Pop order: priority ascending, then creation time ascending.
#[must_use]
pub fn pop_order(a: &Task, b: &Task) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}
