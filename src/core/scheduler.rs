//! Scheduler service: many priority queues behind one interface.
//!
//! Queues are registered per organisation and task kind. All of them share one
//! [`QueueStore`]; the service only routes calls to the right queue and
//! resolves task ids to the queue that holds them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::audit::{build_audit_event, AuditSink};
use super::error::SchedulerError;
use super::filter::FilterRequest;
use super::hasher::TaskHasher;
use super::priority_queue::{PriorityQueue, QueueOptions, QueueSnapshot};
use super::store::QueueStore;
use super::task::{Task, TaskStatus};

/// Queue listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Queue identifier.
    pub id: String,
    /// Queued tasks.
    pub size: usize,
}

/// Registry of priority queues over a shared store.
pub struct SchedulerService {
    queues: RwLock<BTreeMap<String, Arc<PriorityQueue>>>,
    store: Arc<dyn QueueStore>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for SchedulerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerService")
            .field("queues", &self.queues.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SchedulerService {
    /// Create a service with no queues.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            queues: RwLock::new(BTreeMap::new()),
            store,
            audit: None,
        }
    }

    /// Record lifecycle events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Whether task events are sent to an audit sink.
    #[must_use]
    pub fn is_audited(&self) -> bool {
        self.audit.is_some()
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn QueueStore> {
        Arc::clone(&self.store)
    }

    /// Register (or replace) the queue `"<kind>-<organisation>"`.
    pub fn register_queue(
        &self,
        organisation: &str,
        kind: &str,
        options: QueueOptions,
        hasher: Arc<dyn TaskHasher>,
    ) -> Arc<PriorityQueue> {
        let queue_id = queue_id_for(kind, organisation);
        let queue = PriorityQueue::new(queue_id, options, hasher, Arc::clone(&self.store))
            .with_labels(organisation, kind);
        self.insert_queue(queue)
    }

    /// Register an already-built queue under its own id.
    pub fn insert_queue(&self, queue: PriorityQueue) -> Arc<PriorityQueue> {
        let queue = Arc::new(queue);
        info!(queue_id = %queue.id(), max_size = queue.options().max_size, "registered queue");
        self.queues
            .write()
            .insert(queue.id().to_owned(), Arc::clone(&queue));
        queue
    }

    /// Look up a registered queue.
    ///
    /// # Errors
    ///
    /// `NoQueuesAvailable` if no queue has this id.
    pub fn queue(&self, queue_id: &str) -> Result<Arc<PriorityQueue>, SchedulerError> {
        self.queues
            .read()
            .get(queue_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NoQueuesAvailable(queue_id.to_owned()))
    }

    fn all_queues(&self) -> Vec<Arc<PriorityQueue>> {
        self.queues.read().values().cloned().collect()
    }

    /// Every registered queue with its size, ordered by id.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub fn list_queues(&self) -> Result<Vec<QueueSummary>, SchedulerError> {
        self.all_queues()
            .into_iter()
            .map(|q| {
                Ok(QueueSummary {
                    id: q.id().to_owned(),
                    size: q.size()?,
                })
            })
            .collect()
    }

    /// Size and policy of one queue.
    ///
    /// # Errors
    ///
    /// `NoQueuesAvailable` for an unknown queue.
    pub fn snapshot(&self, queue_id: &str) -> Result<QueueSnapshot, SchedulerError> {
        self.queue(queue_id)?.snapshot()
    }

    /// Pop up to `limit` tasks; an empty queue yields an empty list.
    ///
    /// # Errors
    ///
    /// `NoQueuesAvailable` for an unknown queue, `InvalidFilter` for bad filters.
    pub fn pop(
        &self,
        queue_id: &str,
        filters: Option<&FilterRequest>,
        limit: usize,
    ) -> Result<Vec<Task>, SchedulerError> {
        let queue = self.queue(queue_id)?;
        match queue.pop_many(filters, limit.max(1)) {
            Ok(tasks) => {
                for task in &tasks {
                    self.audit(task, "dispatch", None);
                }
                Ok(tasks)
            }
            Err(SchedulerError::QueueEmpty(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Push a task onto a queue.
    ///
    /// # Errors
    ///
    /// `NoQueuesAvailable` plus every error of [`PriorityQueue::push`].
    pub fn push(&self, queue_id: &str, task: Task) -> Result<Task, SchedulerError> {
        let queue = self.queue(queue_id)?;
        let task = queue.push(task)?;
        self.audit(&task, "push", Some(task.status.to_string()));
        Ok(task)
    }

    /// Queue currently holding a record with this id.
    fn locate(&self, task_id: Uuid) -> Result<Arc<PriorityQueue>, SchedulerError> {
        for queue in self.all_queues() {
            if queue.get(task_id)?.is_some() {
                return Ok(queue);
            }
        }
        Err(SchedulerError::TaskNotFound(task_id))
    }

    /// Apply a status change requested by a worker or operator.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` or `InvalidTransition`.
    pub fn patch_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, SchedulerError> {
        let task = self.locate(task_id)?.update_status(task_id, status)?;
        debug!(task_id = %task_id, status = %status, "patched task status");
        self.audit(&task, "status", Some(status.to_string()));
        Ok(task)
    }

    /// Fetch a task by id from any queue.
    ///
    /// # Errors
    ///
    /// `TaskNotFound`.
    pub fn get_task(&self, task_id: Uuid) -> Result<Task, SchedulerError> {
        for queue in self.all_queues() {
            if let Some(task) = queue.get(task_id)? {
                return Ok(task);
            }
        }
        Err(SchedulerError::TaskNotFound(task_id))
    }

    /// Stored tasks of one queue, or of every queue, optionally filtered.
    ///
    /// # Errors
    ///
    /// `NoQueuesAvailable` for an unknown queue, `InvalidFilter` for bad filters.
    pub fn list_tasks(
        &self,
        queue_id: Option<&str>,
        filters: Option<&FilterRequest>,
    ) -> Result<Vec<Task>, SchedulerError> {
        let queues = match queue_id {
            Some(id) => vec![self.queue(id)?],
            None => self.all_queues(),
        };
        let mut tasks = Vec::new();
        for queue in queues {
            tasks.extend(self.store.list(queue.id(), filters)?);
        }
        Ok(tasks)
    }

    fn audit(&self, task: &Task, action: &str, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(task.id, task.queue_id.clone(), action, detail));
        }
    }
}

/// Queue id for a task kind and organisation.
#[must_use]
pub fn queue_id_for(kind: &str, organisation: &str) -> String {
    format!("{kind}-{organisation}")
}
