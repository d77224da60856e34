//! Local dispatch queue shared by the poller and the workers.
//!
//! The staged tasks and the worker → task ownership map live under one
//! mutex, so taking a task and recording who owns it is a single step.
//! Workers block on a condvar; there is no polling.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use super::{PoolError, WorkerId};
use crate::core::Task;

#[derive(Debug, Default)]
struct DispatchState {
    staged: VecDeque<Task>,
    owners: HashMap<WorkerId, Uuid>,
    closed: bool,
}

/// Bounded FIFO of tasks waiting for a worker, plus ownership tracking.
#[derive(Debug)]
pub struct DispatchQueue {
    capacity: usize,
    state: Mutex<DispatchState>,
    available: Condvar,
}

impl DispatchQueue {
    /// Create a queue holding at most `capacity` staged tasks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(DispatchState::default()),
            available: Condvar::new(),
        }
    }

    /// Maximum number of staged tasks.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Staged tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().staged.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stage a task and wake one idle worker.
    ///
    /// # Errors
    ///
    /// `PoolShutdown` once closed, `QueueFull` at capacity.
    pub fn put(&self, task: Task) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::PoolShutdown);
        }
        if state.staged.len() >= self.capacity {
            return Err(PoolError::QueueFull);
        }
        state.staged.push_back(task);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a task is staged and record `worker` as its owner.
    ///
    /// Returns `None` once the queue is closed.
    pub fn take(&self, worker: WorkerId) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(task) = state.staged.pop_front() {
                state.owners.insert(worker, task.id);
                return Some(task);
            }
            self.available.wait(&mut state);
        }
    }

    /// Clear `worker`'s ownership, returning the task it held.
    pub fn release(&self, worker: WorkerId) -> Option<Uuid> {
        self.state.lock().owners.remove(&worker)
    }

    /// Task currently owned by `worker`.
    #[must_use]
    pub fn owned_by(&self, worker: WorkerId) -> Option<Uuid> {
        self.state.lock().owners.get(&worker).copied()
    }

    /// Number of tasks owned by workers.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Remove and return every ownership entry.
    pub fn take_owners(&self) -> Vec<(WorkerId, Uuid)> {
        let mut owners: Vec<_> = self.state.lock().owners.drain().collect();
        owners.sort_by_key(|(worker, _)| *worker);
        owners
    }

    /// Stop accepting and handing out tasks; return whatever was staged.
    ///
    /// Idle workers wake up and exit. Closing is atomic with draining so no
    /// worker can start a task that is being handed back.
    pub fn close_and_drain(&self) -> Vec<Task> {
        let mut state = self.state.lock();
        state.closed = true;
        let staged = state.staged.drain(..).collect();
        drop(state);
        self.available.notify_all();
        staged
    }

    /// Whether the queue was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
