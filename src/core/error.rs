//! Error types for scheduler operations.

use thiserror::Error;
use uuid::Uuid;

use super::task::TaskStatus;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue is at `max_size` and the pushed item does not bypass the limit.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The queue's replace/update policy rejected the push.
    #[error("not allowed: {0}")]
    NotAllowed(String),
    /// No eligible item to pop.
    #[error("queue empty: {0}")]
    QueueEmpty(String),
    /// The task state machine forbids the requested status change.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
    /// The pushed item is malformed (e.g. missing priority).
    #[error("invalid item: {0}")]
    InvalidItem(String),
    /// A filter could not be evaluated.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// No stored task carries this id.
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),
    /// The named queue is not registered.
    #[error("queue not found: {0}")]
    NoQueuesAvailable(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Stable machine-readable name of the error kind, used in API error bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull(_) => "queue_full",
            Self::NotAllowed(_) => "not_allowed",
            Self::QueueEmpty(_) => "queue_empty",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidItem(_) => "invalid_item",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::TaskNotFound(_) => "task_not_found",
            Self::NoQueuesAvailable(_) => "queue_not_found",
            Self::Backend(_) => "backend",
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
