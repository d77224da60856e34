//! Polling, supervision and shutdown of a worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::worker::{exit_of, join_with_timeout, spawn_worker, WorkerContext, WorkerExit};
use super::{DispatchQueue, PoolCounters, PoolError, PoolStats, ShutdownHandle, WorkerId};
use crate::config::WorkerPoolConfig;
use crate::core::{SchedulerClient, Task, TaskHandler, TaskStatus};

struct WorkerSlot {
    id: WorkerId,
    handle: JoinHandle<()>,
}

/// Pulls tasks from the scheduler and runs them on a supervised thread pool.
pub struct WorkerPoolManager {
    config: WorkerPoolConfig,
    client: Arc<dyn SchedulerClient>,
    handler: Arc<dyn TaskHandler>,
    dispatch: Arc<DispatchQueue>,
    counters: Arc<PoolCounters>,
    workers: Mutex<Vec<WorkerSlot>>,
    generation: AtomicU64,
    shutdown: ShutdownHandle,
}

impl std::fmt::Debug for WorkerPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPoolManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl WorkerPoolManager {
    /// Create a manager. Workers start when [`run`](Self::run) is called.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(
        config: WorkerPoolConfig,
        client: Arc<dyn SchedulerClient>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let dispatch = Arc::new(DispatchQueue::new(config.dispatch_capacity()));
        Ok(Self {
            config,
            client,
            handler,
            dispatch,
            counters: Arc::new(PoolCounters::default()),
            workers: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            shutdown: ShutdownHandle::new(),
        })
    }

    /// Handle that stops [`run`](Self::run) gracefully.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(
            self.config.pool_size,
            self.dispatch.len(),
            self.dispatch.owned_count(),
        )
    }

    /// Start the workers, then poll and supervise until shutdown is requested
    /// or polling fails unrecoverably. Either way, staged tasks are handed
    /// back and workers are joined before returning.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped polling, or a worker spawn failure.
    pub async fn run(&self) -> Result<(), PoolError> {
        if self.dispatch.is_closed() {
            return Err(PoolError::PoolShutdown);
        }
        if let Err(e) = self.start_workers() {
            self.shutdown_gracefully().await;
            return Err(e);
        }
        info!(
            pool_size = self.config.pool_size,
            queue_kind = %self.config.queue_kind,
            "worker pool started"
        );

        // Neither loop is cancelled mid-call: a pop that already claimed a
        // task always gets to stage or hand it back.
        let (outcome, ()) = tokio::join!(
            async {
                let result = self.poll_loop().await;
                if let Err(e) = &result {
                    error!(error = %e, "polling stopped unrecoverably");
                    self.shutdown.trigger();
                }
                result
            },
            self.supervise_loop(),
        );

        self.shutdown_gracefully().await;
        outcome
    }

    fn next_id(&self, slot: usize) -> WorkerId {
        WorkerId {
            slot,
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn context(&self) -> WorkerContext {
        WorkerContext {
            dispatch: Arc::clone(&self.dispatch),
            client: Arc::clone(&self.client),
            handler: Arc::clone(&self.handler),
            counters: Arc::clone(&self.counters),
        }
    }

    fn start_workers(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock();
        for slot in 0..self.config.pool_size {
            let id = self.next_id(slot);
            let handle = spawn_worker(id, self.context(), self.config.thread_stack_size)?;
            workers.push(WorkerSlot { id, handle });
        }
        Ok(())
    }

    async fn poll_loop(&self) -> Result<(), PoolError> {
        while !self.shutdown.is_triggered() {
            if self.dispatch.len() > self.config.pool_size {
                debug!(staged = self.dispatch.len(), "dispatch queue saturated, waiting");
                self.pause(self.config.worker_heartbeat).await;
                continue;
            }
            self.fill_dispatch_queue().await?;
        }
        info!("shutdown requested");
        Ok(())
    }

    /// Sleep for `duration`, waking early on shutdown.
    async fn pause(&self, duration: Duration) {
        let mut stop = self.shutdown.subscribe();
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = stop.wait_for(|stopped| *stopped) => {}
        }
    }

    /// One pass over the scheduler's queues: pop at most one task from each
    /// non-empty queue of our kind.
    async fn fill_dispatch_queue(&self) -> Result<(), PoolError> {
        let queues = match self.client.list_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                warn!(error = %e, "listing queues failed");
                self.pause(self.config.poll_interval).await;
                return Ok(());
            }
        };

        let prefix = format!("{}-", self.config.queue_kind);
        let mut staged_any = false;
        for queue in queues.iter().filter(|q| q.id.starts_with(&prefix) && q.size > 0) {
            if self.shutdown.is_triggered() || self.dispatch.len() > self.config.pool_size {
                break;
            }
            let tasks = match self
                .client
                .pop(&queue.id, self.config.pop_filters.as_ref(), 1)
                .await
            {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(queue_id = %queue.id, error = %e, "popping from queue failed");
                    self.pause(self.config.queue_error_backoff).await;
                    continue;
                }
            };
            for task in tasks {
                if self.shutdown.is_triggered() {
                    self.hand_back(&task).await;
                } else {
                    self.stage(task).await?;
                    staged_any = true;
                }
            }
        }

        if !staged_any {
            self.pause(self.config.poll_interval).await;
        }
        Ok(())
    }

    /// Push a claimed task back to the scheduler.
    async fn hand_back(&self, task: &Task) {
        match self.client.push(task).await {
            Ok(_) => {
                PoolCounters::bump(&self.counters.handed_back_tasks);
                info!(task_id = %task.id, queue_id = %task.queue_id, "handed task back to scheduler");
            }
            Err(e) => error!(task_id = %task.id, error = %e, "could not hand task back"),
        }
    }

    async fn stage(&self, task: Task) -> Result<(), PoolError> {
        let task_id = task.id;
        let queue_id = task.queue_id.clone();
        match self.dispatch.put(task) {
            Ok(()) => {
                PoolCounters::bump(&self.counters.polled_tasks);
                info!(task_id = %task_id, queue_id = %queue_id, "staged task for dispatch");
                Ok(())
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "could not stage popped task");
                if let Err(patch) = self.client.patch_status(task_id, TaskStatus::Failed).await {
                    error!(task_id = %task_id, error = %patch, "could not mark unstaged task failed");
                }
                Err(e)
            }
        }
    }

    async fn supervise_loop(&self) {
        let mut stop = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.worker_heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.wait_for(|stopped| *stopped) => return,
            }
            self.replace_dead_workers().await;
        }
    }

    /// Replace every worker whose thread ended and fail the task it held.
    ///
    /// Returns the number of workers replaced.
    pub async fn replace_dead_workers(&self) -> usize {
        if self.dispatch.is_closed() {
            return 0;
        }
        let dead: Vec<WorkerSlot> = {
            let mut workers = self.workers.lock();
            let mut dead = Vec::new();
            for slot in workers.iter_mut() {
                if !slot.handle.is_finished() {
                    continue;
                }
                let id = self.next_id(slot.id.slot);
                match spawn_worker(id, self.context(), self.config.thread_stack_size) {
                    Ok(handle) => dead.push(std::mem::replace(slot, WorkerSlot { id, handle })),
                    Err(e) => error!(worker = %slot.id, error = %e, "could not start replacement worker"),
                }
            }
            dead
        };

        let replaced = dead.len();
        for slot in dead {
            let exit = exit_of(slot.handle);
            warn!(worker = %slot.id, reason = %exit, "worker died, started replacement");
            PoolCounters::bump(&self.counters.restarted_workers);
            if let Some(task_id) = self.dispatch.release(slot.id) {
                self.fail_orphaned_task(task_id).await;
            }
        }
        replaced
    }

    /// Fail a task whose worker is gone, unless it already settled.
    async fn fail_orphaned_task(&self, task_id: Uuid) {
        let task = match self.client.get_task(task_id).await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "could not fetch orphaned task");
                return;
            }
        };
        if !matches!(task.status, TaskStatus::Dispatched | TaskStatus::Running) {
            debug!(task_id = %task_id, status = %task.status, "orphaned task already settled");
            return;
        }
        match self.client.patch_status(task_id, TaskStatus::Failed).await {
            Ok(_) => {
                PoolCounters::bump(&self.counters.failed_tasks);
                warn!(task_id = %task_id, "marked orphaned task failed");
            }
            Err(e) => error!(task_id = %task_id, error = %e, "could not mark orphaned task failed"),
        }
    }

    /// Hand staged tasks back, stop and join the workers, fail what they held.
    async fn shutdown_gracefully(&self) {
        let staged = self.dispatch.close_and_drain();
        info!(staged = staged.len(), "shutting down worker pool");
        for task in &staged {
            self.hand_back(task).await;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let timeout = self.config.shutdown_timeout;
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(|slot| (slot.id, join_with_timeout(slot.handle, timeout)))
                .collect::<Vec<_>>()
        })
        .await;
        match joined {
            Ok(exits) => {
                for (id, exit) in exits {
                    match exit {
                        WorkerExit::Clean => debug!(worker = %id, "worker joined"),
                        other => warn!(worker = %id, reason = %other, "worker did not stop cleanly"),
                    }
                }
            }
            Err(e) => error!(error = %e, "joining workers failed"),
        }

        for (worker, task_id) in self.dispatch.take_owners() {
            warn!(worker = %worker, task_id = %task_id, "worker still held a task at shutdown");
            self.fail_orphaned_task(task_id).await;
        }
        info!("worker pool shut down");
    }
}
