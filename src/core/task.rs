//! Task model and the lifecycle state machine shared by scheduler and workers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::SchedulerError;
use crate::util::serde::duration_secs_opt;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created but not yet on a queue.
    Pending,
    /// Waiting on a queue.
    Queued,
    /// Popped by a worker manager, not yet started.
    Dispatched,
    /// Being executed by a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error or lost with its worker.
    Failed,
    /// Withdrawn before finishing.
    Cancelled,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Queued,
        Self::Dispatched,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Queued)
                | (Self::Queued, Self::Dispatched)
                | (Self::Dispatched, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Queued | Self::Dispatched | Self::Running, Self::Failed)
                | (
                    Self::Pending | Self::Queued | Self::Dispatched | Self::Running,
                    Self::Cancelled
                )
        )
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown task status `{s}`"))
    }
}

const fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

/// A unit of schedulable work.
///
/// `hash` identifies the work by content and drives deduplication; `id`
/// identifies this particular record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Record identity, assigned at creation.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Owning queue (`<kind>-<organisation>`).
    #[serde(default)]
    pub queue_id: String,
    /// Content fingerprint, computed by the queue on push.
    #[serde(default)]
    pub hash: Option<String>,
    /// Lower values are popped first; must be positive.
    #[serde(default)]
    pub priority: i64,
    /// Current lifecycle status.
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    /// Opaque work description handed to the task handler.
    #[serde(default)]
    pub payload: Value,
    /// Organisation label of the owning queue.
    #[serde(default)]
    pub organisation: Option<String>,
    /// Task kind label of the owning queue.
    #[serde(default)]
    pub kind: Option<String>,
    /// Time spent pending.
    #[serde(default, with = "duration_secs_opt")]
    pub pending: Option<Duration>,
    /// Time spent queued.
    #[serde(default, with = "duration_secs_opt")]
    pub queued: Option<Duration>,
    /// Time spent dispatched.
    #[serde(default, with = "duration_secs_opt")]
    pub dispatched: Option<Duration>,
    /// Time spent running.
    #[serde(default, with = "duration_secs_opt")]
    pub running: Option<Duration>,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last status or content change.
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task for `queue_id`.
    pub fn new(queue_id: impl Into<String>, priority: i64, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            queue_id: queue_id.into(),
            hash: None,
            priority,
            status: TaskStatus::Pending,
            payload,
            organisation: None,
            kind: None,
            pending: None,
            queued: None,
            dispatched: None,
            running: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Whether the task reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, recording how long the task spent in its current status.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTransition` and leaves the task untouched
    /// when the edge is not part of the state machine.
    pub fn update_status(&mut self, next: TaskStatus) -> Result<(), SchedulerError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.record_transition(next, Utc::now());
        Ok(())
    }

    /// Return a dispatched task to the queue after its worker handed it back.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTransition` unless the task is dispatched.
    pub(crate) fn requeue(&mut self) -> Result<(), SchedulerError> {
        if self.status != TaskStatus::Dispatched {
            return Err(SchedulerError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Queued,
            });
        }
        self.record_transition(TaskStatus::Queued, Utc::now());
        Ok(())
    }

    fn record_transition(&mut self, next: TaskStatus, now: DateTime<Utc>) {
        let recorded: Duration = [self.pending, self.queued, self.dispatched, self.running]
            .into_iter()
            .flatten()
            .sum();
        let total = (now - self.created_at).to_std().unwrap_or_default();
        let spent = Some(total.saturating_sub(recorded));
        match self.status {
            TaskStatus::Pending => self.pending = spent,
            TaskStatus::Queued => self.queued = spent,
            TaskStatus::Dispatched => self.dispatched = spent,
            TaskStatus::Running => self.running = spent,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {}
        }
        self.status = next;
        self.modified_at = now;
    }
}
