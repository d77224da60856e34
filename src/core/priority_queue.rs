//! Deduplicating priority queue over a [`QueueStore`].
//!
//! A queue orders tasks by priority (lowest value first) and creation time,
//! rejects content-duplicates unless its policy allows replacing them, and
//! enforces an optional size limit. Durability is delegated to the store.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::SchedulerError;
use super::filter::FilterRequest;
use super::hasher::TaskHasher;
use super::store::QueueStore;
use super::task::{Task, TaskStatus};

/// Size limit and mutation policy of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Maximum number of queued tasks; 0 means unbounded.
    #[serde(default)]
    pub max_size: usize,
    /// Accept any push whose hash is already live.
    #[serde(default)]
    pub allow_replace: bool,
    /// Accept a live hash when the payload differs.
    #[serde(default)]
    pub allow_updates: bool,
    /// Accept a live hash when the priority differs.
    #[serde(default)]
    pub allow_priority_updates: bool,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue identifier.
    pub id: String,
    /// Queued tasks.
    pub size: usize,
    /// Size limit (0 = unbounded).
    pub max_size: usize,
    /// Replace policy.
    pub allow_replace: bool,
    /// Content-update policy.
    pub allow_updates: bool,
    /// Priority-update policy.
    pub allow_priority_updates: bool,
}

/// One named priority queue.
pub struct PriorityQueue {
    id: String,
    options: QueueOptions,
    hasher: Arc<dyn TaskHasher>,
    store: Arc<dyn QueueStore>,
    organisation: Option<String>,
    kind: Option<String>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PriorityQueue {
    /// Create a queue named `id` backed by `store`.
    pub fn new(
        id: impl Into<String>,
        options: QueueOptions,
        hasher: Arc<dyn TaskHasher>,
        store: Arc<dyn QueueStore>,
    ) -> Self {
        Self {
            id: id.into(),
            options,
            hasher,
            store,
            organisation: None,
            kind: None,
            lock: Mutex::new(()),
        }
    }

    /// Label tasks pushed onto this queue with their organisation and kind.
    #[must_use]
    pub fn with_labels(mut self, organisation: impl Into<String>, kind: impl Into<String>) -> Self {
        self.organisation = Some(organisation.into());
        self.kind = Some(kind.into());
        self
    }

    /// Queue identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Size limit and policy.
    #[must_use]
    pub const fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Add a task, deduplicating by content hash.
    ///
    /// A task whose hash is already live on the queue is accepted only if
    /// `allow_replace` is set, or `allow_updates` is set and the payload
    /// differs, or `allow_priority_updates` is set and the priority differs.
    /// An accepted duplicate of a queued task updates that task in place; a
    /// duplicate of a task already in flight is stored as a new queued record.
    /// A dispatched task pushed back under its own id returns to the queue.
    ///
    /// # Errors
    ///
    /// - `InvalidItem` if the priority is not positive
    /// - `QueueFull` if the queue is full and the priority is above 1
    /// - `NotAllowed` if the policy rejects a duplicate
    pub fn push(&self, mut task: Task) -> Result<Task, SchedulerError> {
        let _guard = self.lock.lock();

        if task.priority <= 0 {
            return Err(SchedulerError::InvalidItem(format!(
                "task {} needs a positive priority, got {}",
                task.id, task.priority
            )));
        }
        let hash = self.hasher.hash(&task.payload);
        task.queue_id.clone_from(&self.id);
        task.hash = Some(hash.clone());
        if self.organisation.is_some() {
            task.organisation.clone_from(&self.organisation);
            task.kind.clone_from(&self.kind);
        }

        if let Some(stored) = self.store.get_by_id(&self.id, task.id)? {
            match stored.status {
                TaskStatus::Dispatched => return self.hand_back(stored, &hash),
                TaskStatus::Queued | TaskStatus::Pending if stored.hash.as_deref() != Some(hash.as_str()) => {
                    return Err(SchedulerError::InvalidItem(format!(
                        "task {} is already queued with a different payload",
                        task.id
                    )))
                }
                TaskStatus::Queued | TaskStatus::Pending => {}
                status => {
                    return Err(SchedulerError::InvalidItem(format!(
                        "task {} is already stored with status {status}",
                        task.id
                    )))
                }
            }
        }

        // Priority 1 skips the size limit.
        if self.full_locked()? && task.priority > 1 {
            return Err(SchedulerError::QueueFull(format!(
                "queue {} reached max_size {}",
                self.id, self.options.max_size
            )));
        }

        let Some(existing) = self.store.get_by_hash(&self.id, &hash)? else {
            return self.insert(task);
        };

        let item_changed = existing.payload != task.payload;
        let priority_changed = existing.priority != task.priority;
        if !(self.options.allow_replace
            || (self.options.allow_updates && item_changed)
            || (self.options.allow_priority_updates && priority_changed))
        {
            return Err(SchedulerError::NotAllowed(self.rejection(item_changed, priority_changed)));
        }

        if existing.status == TaskStatus::Queued {
            let mut updated = existing;
            updated.payload = task.payload;
            updated.priority = task.priority;
            updated.organisation = task.organisation;
            updated.kind = task.kind;
            updated.modified_at = Utc::now();
            self.store.update(&updated)?;
            debug!(queue_id = %self.id, task_id = %updated.id, priority = updated.priority, "updated queued task in place");
            return Ok(updated);
        }

        debug!(
            queue_id = %self.id,
            superseded = %existing.id,
            status = %existing.status,
            "queueing new record for in-flight task"
        );
        self.insert(task)
    }

    fn insert(&self, mut task: Task) -> Result<Task, SchedulerError> {
        if task.status == TaskStatus::Pending {
            task.update_status(TaskStatus::Queued)?;
        } else {
            task.status = TaskStatus::Queued;
            task.modified_at = Utc::now();
        }
        let stored = self.store.push(task)?;
        debug!(queue_id = %self.id, task_id = %stored.id, priority = stored.priority, "pushed task");
        Ok(stored)
    }

    /// A worker returned a dispatched task it never started.
    fn hand_back(&self, mut stored: Task, hash: &str) -> Result<Task, SchedulerError> {
        if let Some(live) = self.store.get_by_hash(&self.id, hash)? {
            if live.id != stored.id && live.status == TaskStatus::Queued {
                // Same work is already queued again; retire the returned record.
                stored.update_status(TaskStatus::Cancelled)?;
                self.store.update(&stored)?;
                info!(queue_id = %self.id, task_id = %stored.id, queued = %live.id, "handed-back task already requeued");
                return Ok(live);
            }
        }
        stored.requeue()?;
        self.store.update(&stored)?;
        info!(queue_id = %self.id, task_id = %stored.id, "task handed back to queue");
        Ok(stored)
    }

    fn rejection(&self, item_changed: bool, priority_changed: bool) -> String {
        let prefix = format!("item already on queue {}", self.id);
        if priority_changed {
            format!("{prefix} and priority changed, we're not allowed to update the priority of the item")
        } else if item_changed {
            format!("{prefix} and item changed, we're not allowed to update the item")
        } else {
            format!("{prefix}, we're not allowed to replace the item that is already on the queue")
        }
    }

    /// Remove and return the next task matching `filters`, marking it dispatched.
    ///
    /// # Errors
    ///
    /// `QueueEmpty` if nothing is eligible; `InvalidFilter` for bad filters.
    pub fn pop(&self, filters: Option<&FilterRequest>) -> Result<Task, SchedulerError> {
        let _guard = self.lock.lock();
        self.pop_locked(filters)?
            .ok_or_else(|| SchedulerError::QueueEmpty(format!("queue {} is empty", self.id)))
    }

    /// Pop up to `limit` tasks in order.
    ///
    /// # Errors
    ///
    /// `QueueEmpty` if not even one task is eligible.
    pub fn pop_many(&self, filters: Option<&FilterRequest>, limit: usize) -> Result<Vec<Task>, SchedulerError> {
        let _guard = self.lock.lock();
        let mut popped = Vec::with_capacity(limit.min(64));
        while popped.len() < limit {
            match self.pop_locked(filters)? {
                Some(task) => popped.push(task),
                None => break,
            }
        }
        if popped.is_empty() {
            return Err(SchedulerError::QueueEmpty(format!("queue {} is empty", self.id)));
        }
        Ok(popped)
    }

    fn pop_locked(&self, filters: Option<&FilterRequest>) -> Result<Option<Task>, SchedulerError> {
        let popped = self.store.pop(&self.id, filters)?;
        if let Some(task) = &popped {
            debug!(queue_id = %self.id, task_id = %task.id, priority = task.priority, "popped task");
        }
        Ok(popped)
    }

    /// Task at position `index` in pop order, without removing it.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn peek(&self, index: usize) -> Result<Option<Task>, SchedulerError> {
        self.store.peek(&self.id, index)
    }

    /// Delete a task by identity.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn remove(&self, task: &Task) -> Result<Option<Task>, SchedulerError> {
        let _guard = self.lock.lock();
        let removed = self.store.remove(&self.id, task.id)?;
        if removed.is_none() {
            warn!(queue_id = %self.id, task_id = %task.id, "remove of unknown task");
        }
        Ok(removed)
    }

    /// Delete every record of this queue.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn clear(&self) -> Result<(), SchedulerError> {
        let _guard = self.lock.lock();
        self.store.clear(&self.id)
    }

    /// Apply a status change to a stored task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` or `InvalidTransition`.
    pub fn update_status(&self, id: uuid::Uuid, status: TaskStatus) -> Result<Task, SchedulerError> {
        let _guard = self.lock.lock();
        let mut task = self
            .store
            .get_by_id(&self.id, id)?
            .ok_or(SchedulerError::TaskNotFound(id))?;
        task.update_status(status)?;
        self.store.update(&task)?;
        Ok(task)
    }

    /// Whether a live task with the same content hash exists.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn is_on_queue(&self, task: &Task) -> Result<bool, SchedulerError> {
        self.is_on_queue_by_hash(&self.hasher.hash(&task.payload))
    }

    /// Whether a live task with this hash exists.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn is_on_queue_by_hash(&self, hash: &str) -> Result<bool, SchedulerError> {
        Ok(self.store.get_by_hash(&self.id, hash)?.is_some())
    }

    /// Stored record with this id, in any status.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn get(&self, id: uuid::Uuid) -> Result<Option<Task>, SchedulerError> {
        self.store.get_by_id(&self.id, id)
    }

    /// Number of queued tasks.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn size(&self) -> Result<usize, SchedulerError> {
        self.store.size(&self.id)
    }

    /// Whether no task is queued.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn empty(&self) -> Result<bool, SchedulerError> {
        self.store.empty(&self.id)
    }

    /// Whether the size limit is reached.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn full(&self) -> Result<bool, SchedulerError> {
        self.full_locked()
    }

    fn full_locked(&self) -> Result<bool, SchedulerError> {
        if self.options.max_size == 0 {
            return Ok(false);
        }
        Ok(self.store.size(&self.id)? >= self.options.max_size)
    }

    /// Current size and policy.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn snapshot(&self) -> Result<QueueSnapshot, SchedulerError> {
        Ok(QueueSnapshot {
            id: self.id.clone(),
            size: self.size()?,
            max_size: self.options.max_size,
            allow_replace: self.options.allow_replace,
            allow_updates: self.options.allow_updates,
            allow_priority_updates: self.options.allow_priority_updates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::FieldHasher;
    use crate::infra::store::InMemoryQueueStore;
    use serde_json::json;

    fn queue(options: QueueOptions) -> PriorityQueue {
        PriorityQueue::new(
            "boefje-acme",
            options,
            Arc::new(FieldHasher::new(["target"])),
            Arc::new(InMemoryQueueStore::new()),
        )
    }

    #[test]
    fn test_rejects_non_positive_priority() {
        let q = queue(QueueOptions::default());
        let err = q.push(Task::new("", 0, json!({"target": "a"}))).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidItem(_)));
        assert!(q.empty().unwrap());
    }

    #[test]
    fn test_push_assigns_queue_hash_and_status() {
        let q = queue(QueueOptions::default()).with_labels("acme", "boefje");
        let task = q.push(Task::new("elsewhere", 3, json!({"target": "a"}))).unwrap();
        assert_eq!(task.queue_id, "boefje-acme");
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.organisation.as_deref(), Some("acme"));
        assert_eq!(task.kind.as_deref(), Some("boefje"));
        assert!(task.hash.is_some());
        assert!(task.pending.is_some());
    }

    #[test]
    fn test_rejection_names_the_policy() {
        let q = queue(QueueOptions::default());
        q.push(Task::new("", 2, json!({"target": "a", "v": 1}))).unwrap();

        let same = q.push(Task::new("", 2, json!({"target": "a", "v": 1}))).unwrap_err();
        assert!(same.to_string().contains("not allowed to replace"));
        let content = q.push(Task::new("", 2, json!({"target": "a", "v": 2}))).unwrap_err();
        assert!(content.to_string().contains("not allowed to update the item"));
        let priority = q.push(Task::new("", 5, json!({"target": "a", "v": 1}))).unwrap_err();
        assert!(priority.to_string().contains("priority"));
    }

    #[test]
    fn test_pop_many_and_snapshot() {
        let q = queue(QueueOptions {
            max_size: 10,
            ..QueueOptions::default()
        });
        for (i, target) in ["a", "b", "c"].into_iter().enumerate() {
            q.push(Task::new("", i64::try_from(i).unwrap() + 1, json!({"target": target}))).unwrap();
        }
        let popped = q.pop_many(None, 2).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].payload["target"], "a");
        assert_eq!(popped[1].payload["target"], "b");

        let snapshot = q.snapshot().unwrap();
        assert_eq!(snapshot.size, 1);
        assert_eq!(snapshot.max_size, 10);

        q.pop(None).unwrap();
        assert!(matches!(q.pop_many(None, 3), Err(SchedulerError::QueueEmpty(_))));
    }

    #[test]
    fn test_update_status_uses_state_machine() {
        let q = queue(QueueOptions::default());
        let task = q.push(Task::new("", 1, json!({"target": "a"}))).unwrap();
        assert!(matches!(
            q.update_status(task.id, TaskStatus::Running),
            Err(SchedulerError::InvalidTransition { .. })
        ));
        q.update_status(task.id, TaskStatus::Cancelled).unwrap();
        assert!(!q.is_on_queue(&task).unwrap());
        assert!(matches!(
            q.update_status(uuid::Uuid::new_v4(), TaskStatus::Failed),
            Err(SchedulerError::TaskNotFound(_))
        ));
    }
}
