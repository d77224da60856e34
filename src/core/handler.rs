//! Task execution trait.

use async_trait::async_trait;

use super::error::AppResult;
use super::task::Task;

/// Executes the payload of one task.
///
/// The worker pool is agnostic to what a task does; it only needs to know
/// whether handling succeeded.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_dispatch::core::{AppResult, Task, TaskHandler};
///
/// struct EchoHandler;
///
/// #[async_trait]
/// impl TaskHandler for EchoHandler {
///     async fn handle(&self, task: &Task) -> AppResult<()> {
///         println!("{}", task.payload);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run the task to completion.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread inside that thread's own
    /// single-threaded tokio runtime, so blocking work does not stall the
    /// manager. A panic here takes the worker down and the task is marked
    /// failed by crash recovery.
    ///
    /// # Errors
    ///
    /// Any error marks the task `FAILED`.
    async fn handle(&self, task: &Task) -> AppResult<()>;
}
