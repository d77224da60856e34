//! Worker threads.
//!
//! Each worker is a dedicated OS thread with its own single-threaded tokio
//! runtime. It blocks on the dispatch queue, so an idle worker costs nothing,
//! and exits when the queue is closed. A panic inside the handler unwinds the
//! thread with its ownership entry still recorded; the supervisor treats that
//! as a crash.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{DispatchQueue, PoolCounters, PoolError, WorkerId};
use crate::core::{ClientError, SchedulerClient, Task, TaskHandler, TaskStatus};
use crate::util::retry::retry;

/// Attempts for the final status patch.
const FINAL_PATCH_ATTEMPTS: u32 = 3;
/// Delay between final patch attempts.
const FINAL_PATCH_DELAY: Duration = Duration::from_millis(500);

/// Everything a worker thread needs, shared with the manager.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub dispatch: Arc<DispatchQueue>,
    pub client: Arc<dyn SchedulerClient>,
    pub handler: Arc<dyn TaskHandler>,
    pub counters: Arc<PoolCounters>,
}

/// How a worker thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum WorkerExit {
    /// Returned normally.
    Clean,
    /// Unwound with this panic message.
    Panicked(String),
    /// Still running when the join timeout expired.
    TimedOut,
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "exited"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
            Self::TimedOut => write!(f, "did not exit within timeout"),
        }
    }
}

/// Spawn a worker thread.
pub(super) fn spawn_worker(
    id: WorkerId,
    ctx: WorkerContext,
    stack_size: usize,
) -> Result<JoinHandle<()>, PoolError> {
    thread::Builder::new()
        .name(format!("dispatch-{id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker = %id, "worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker = %id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            while let Some(task) = ctx.dispatch.take(id) {
                run_task(&rt, &ctx, id, &task);
                ctx.dispatch.release(id);
            }

            debug!(worker = %id, "dispatch queue closed, worker exiting");
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn {id}: {e}")))
}

fn run_task(rt: &Runtime, ctx: &WorkerContext, id: WorkerId, task: &Task) {
    let task_id = task.id;

    if let Err(e) = rt.block_on(ctx.client.patch_status(task_id, TaskStatus::Running)) {
        if !e.is_transient() {
            // Cancelled or otherwise settled while staged; not ours to fail.
            info!(worker = %id, task_id = %task_id, error = %e, "scheduler refused to start task, skipping");
            return;
        }
        warn!(worker = %id, task_id = %task_id, error = %e, "could not mark task running");
        if let Err(e) = rt.block_on(ctx.client.patch_status(task_id, TaskStatus::Failed)) {
            error!(worker = %id, task_id = %task_id, error = %e, "could not mark unstarted task failed");
        }
        PoolCounters::bump(&ctx.counters.failed_tasks);
        return;
    }

    info!(worker = %id, task_id = %task_id, queue_id = %task.queue_id, "handling task");
    let started = Instant::now();
    let outcome = match rt.block_on(ctx.handler.handle(task)) {
        Ok(()) => TaskStatus::Completed,
        Err(e) => {
            error!(worker = %id, task_id = %task_id, error = ?e, "task handler failed");
            TaskStatus::Failed
        }
    };
    let elapsed = started.elapsed();

    let reported = retry(
        || match rt.block_on(finalize(ctx.client.as_ref(), task_id, outcome)) {
            Ok(()) => true,
            Err(e) if e.is_transient() => {
                warn!(worker = %id, task_id = %task_id, error = %e, "final status patch failed, retrying");
                false
            }
            Err(e) => {
                error!(worker = %id, task_id = %task_id, error = %e, "final status patch rejected");
                true
            }
        },
        FINAL_PATCH_ATTEMPTS,
        FINAL_PATCH_DELAY,
    );
    if !reported {
        error!(worker = %id, task_id = %task_id, status = %outcome, "giving up on final status patch");
    }

    match outcome {
        TaskStatus::Completed => PoolCounters::bump(&ctx.counters.completed_tasks),
        _ => PoolCounters::bump(&ctx.counters.failed_tasks),
    }
    info!(
        worker = %id,
        task_id = %task_id,
        status = %outcome,
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "task finished"
    );
}

/// Patch the outcome only if nobody else moved the task on while it ran.
async fn finalize(client: &dyn SchedulerClient, task_id: Uuid, outcome: TaskStatus) -> Result<(), ClientError> {
    let current = client.get_task(task_id).await?;
    if current.status != TaskStatus::Running {
        info!(task_id = %task_id, status = %current.status, "task changed while running, keeping its status");
        return Ok(());
    }
    client.patch_status(task_id, outcome).await?;
    Ok(())
}

/// Join a worker, giving up after `timeout` and leaving the thread detached.
pub(super) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> WorkerExit {
    if handle.is_finished() {
        return exit_of(handle);
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    let joiner = thread::Builder::new()
        .name("dispatch-joiner".into())
        .spawn(move || {
            let _ = tx.send(exit_of(handle));
        });
    if let Err(e) = joiner {
        return WorkerExit::Panicked(format!("could not spawn joiner: {e}"));
    }
    rx.recv_timeout(timeout).unwrap_or(WorkerExit::TimedOut)
}

/// Exit reason of a worker whose thread has finished.
pub(super) fn exit_of(handle: JoinHandle<()>) -> WorkerExit {
    match handle.join() {
        Ok(()) => WorkerExit::Clean,
        Err(payload) => WorkerExit::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}
