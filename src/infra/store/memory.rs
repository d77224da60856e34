//! In-memory queue store.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::core::store::pop_order;
use crate::core::{FilterRequest, QueueStore, SchedulerError, Task, TaskStatus};

/// Store keeping every queue's records in a map of vectors.
///
/// Reads share the lock; every mutation takes it exclusively for the whole
/// select-and-update step.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<String, Vec<Task>>>,
}

impl InMemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records, e.g. loaded from disk.
    #[must_use]
    pub fn with_records(records: HashMap<String, Vec<Task>>) -> Self {
        Self {
            queues: RwLock::new(records),
        }
    }

    /// Total records across all queues.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.queues.read().values().map(Vec::len).sum()
    }

    /// Copy of one queue's records, `None` if the queue holds none.
    pub(crate) fn queue_records(&self, queue_id: &str) -> Option<Vec<Task>> {
        self.queues.read().get(queue_id).cloned()
    }

    /// Put back records taken with [`queue_records`](Self::queue_records).
    pub(crate) fn restore_queue(&self, queue_id: &str, records: Option<Vec<Task>>) {
        let mut queues = self.queues.write();
        match records {
            Some(records) => {
                queues.insert(queue_id.to_owned(), records);
            }
            None => {
                queues.remove(queue_id);
            }
        }
    }
}

fn matches(filters: Option<&FilterRequest>, task: &Task) -> Result<bool, SchedulerError> {
    filters.map_or(Ok(true), |f| f.matches(task))
}

impl QueueStore for InMemoryQueueStore {
    fn push(&self, task: Task) -> Result<Task, SchedulerError> {
        let mut queues = self.queues.write();
        let records = queues.entry(task.queue_id.clone()).or_default();
        if records.iter().any(|t| t.id == task.id) {
            return Err(SchedulerError::Backend(format!(
                "task {} already stored in {}",
                task.id, task.queue_id
            )));
        }
        records.push(task.clone());
        Ok(task)
    }

    fn pop(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Option<Task>, SchedulerError> {
        let mut queues = self.queues.write();
        let Some(records) = queues.get_mut(queue_id) else {
            return Ok(None);
        };
        let mut best: Option<usize> = None;
        for (idx, task) in records.iter().enumerate() {
            if task.status != TaskStatus::Queued || !matches(filters, task)? {
                continue;
            }
            if best.is_none_or(|b| pop_order(task, &records[b]).is_lt()) {
                best = Some(idx);
            }
        }
        let Some(idx) = best else {
            return Ok(None);
        };
        let task = &mut records[idx];
        task.update_status(TaskStatus::Dispatched)?;
        Ok(Some(task.clone()))
    }

    fn peek(&self, queue_id: &str, index: usize) -> Result<Option<Task>, SchedulerError> {
        let queues = self.queues.read();
        let Some(records) = queues.get(queue_id) else {
            return Ok(None);
        };
        let mut queued: Vec<&Task> = records
            .iter()
            .filter(|t| t.status == TaskStatus::Queued)
            .collect();
        queued.sort_by(|a, b| pop_order(a, b));
        Ok(queued.get(index).map(|t| (*t).clone()))
    }

    fn update(&self, task: &Task) -> Result<(), SchedulerError> {
        let mut queues = self.queues.write();
        let slot = queues
            .get_mut(&task.queue_id)
            .and_then(|records| records.iter_mut().find(|t| t.id == task.id))
            .ok_or(SchedulerError::TaskNotFound(task.id))?;
        *slot = task.clone();
        Ok(())
    }

    fn remove(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError> {
        let mut queues = self.queues.write();
        let Some(records) = queues.get_mut(queue_id) else {
            return Ok(None);
        };
        let removed = records
            .iter()
            .position(|t| t.id == id)
            .map(|idx| records.remove(idx));
        if records.is_empty() {
            queues.remove(queue_id);
        }
        Ok(removed)
    }

    fn get_by_hash(&self, queue_id: &str, hash: &str) -> Result<Option<Task>, SchedulerError> {
        let queues = self.queues.read();
        Ok(queues.get(queue_id).and_then(|records| {
            records
                .iter()
                .filter(|t| !t.is_terminal() && t.hash.as_deref() == Some(hash))
                .max_by_key(|t| t.created_at)
                .cloned()
        }))
    }

    fn get_by_id(&self, queue_id: &str, id: Uuid) -> Result<Option<Task>, SchedulerError> {
        let queues = self.queues.read();
        Ok(queues
            .get(queue_id)
            .and_then(|records| records.iter().find(|t| t.id == id).cloned()))
    }

    fn list(&self, queue_id: &str, filters: Option<&FilterRequest>) -> Result<Vec<Task>, SchedulerError> {
        let queues = self.queues.read();
        let mut out = Vec::new();
        for task in queues.get(queue_id).into_iter().flatten() {
            if matches(filters, task)? {
                out.push(task.clone());
            }
        }
        Ok(out)
    }

    fn size(&self, queue_id: &str) -> Result<usize, SchedulerError> {
        let queues = self.queues.read();
        Ok(queues.get(queue_id).map_or(0, |records| {
            records.iter().filter(|t| t.status == TaskStatus::Queued).count()
        }))
    }

    fn clear(&self, queue_id: &str) -> Result<(), SchedulerError> {
        self.queues.write().remove(queue_id);
        Ok(())
    }

    fn queue_ids(&self) -> Result<Vec<String>, SchedulerError> {
        let mut ids: Vec<String> = self.queues.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
