//! Worker-side view of the scheduler.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::error::SchedulerError;
use super::filter::FilterRequest;
use super::scheduler::{QueueSummary, SchedulerService};
use super::task::{Task, TaskStatus};

/// Errors talking to the scheduler.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The scheduler answered with a non-success status.
    #[error("scheduler returned {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body.
        body: String,
    },
    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// In-process scheduler rejected the call.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ClientError {
    /// Whether the scheduler said the task or queue does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Status { code: 404, .. }
                | Self::Scheduler(SchedulerError::TaskNotFound(_) | SchedulerError::NoQueuesAvailable(_))
        )
    }

    /// Whether retrying the same call could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
            || matches!(self, Self::Status { code, .. } if *code >= 500)
    }
}

/// Calls a worker pool makes against the scheduler.
#[async_trait]
pub trait SchedulerClient: Send + Sync + 'static {
    /// Whether the scheduler is up.
    async fn health(&self) -> Result<bool, ClientError>;

    /// Every queue with its size.
    async fn list_queues(&self) -> Result<Vec<QueueSummary>, ClientError>;

    /// Pop up to `limit` tasks; empty when the queue has nothing eligible.
    async fn pop(
        &self,
        queue_id: &str,
        filters: Option<&FilterRequest>,
        limit: usize,
    ) -> Result<Vec<Task>, ClientError>;

    /// Push a task onto `task.queue_id`.
    async fn push(&self, task: &Task) -> Result<Task, ClientError>;

    /// Change a task's status.
    async fn patch_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError>;

    /// Fetch a task.
    async fn get_task(&self, task_id: Uuid) -> Result<Task, ClientError>;
}

/// Direct calls, for embedding the worker pool next to the scheduler.
#[async_trait]
impl SchedulerClient for SchedulerService {
    async fn health(&self) -> Result<bool, ClientError> {
        Ok(true)
    }

    async fn list_queues(&self) -> Result<Vec<QueueSummary>, ClientError> {
        Ok(SchedulerService::list_queues(self)?)
    }

    async fn pop(
        &self,
        queue_id: &str,
        filters: Option<&FilterRequest>,
        limit: usize,
    ) -> Result<Vec<Task>, ClientError> {
        Ok(SchedulerService::pop(self, queue_id, filters, limit)?)
    }

    async fn push(&self, task: &Task) -> Result<Task, ClientError> {
        Ok(SchedulerService::push(self, &task.queue_id, task.clone())?)
    }

    async fn patch_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError> {
        Ok(SchedulerService::patch_status(self, task_id, status)?)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Task, ClientError> {
        Ok(SchedulerService::get_task(self, task_id)?)
    }
}
