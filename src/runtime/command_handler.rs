//! Task handler that runs an external command per task.

use std::env;
use std::process::Stdio;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::{AppResult, Task, TaskHandler};

/// Runs `program args...` with the task JSON on stdin; exit code 0 means
/// the task completed.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
}

impl CommandHandler {
    /// Create a handler for `program` with fixed arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from `WORKER_COMMAND`, split on whitespace.
    ///
    /// # Errors
    ///
    /// Fails when the variable is unset or empty.
    pub fn from_env() -> AppResult<Self> {
        let raw = env::var("WORKER_COMMAND").context("WORKER_COMMAND is not set")?;
        let mut parts = raw.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("WORKER_COMMAND is empty"))?;
        Ok(Self::new(program, parts))
    }

    /// Program invoked per task.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl TaskHandler for CommandHandler {
    async fn handle(&self, task: &Task) -> AppResult<()> {
        let input = serde_json::to_vec(task).context("serializing task")?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("TASK_ID", task.id.to_string())
            .env("QUEUE_ID", &task.queue_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning `{}`", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await.context("writing task to stdin")?;
            stdin.shutdown().await.context("closing stdin")?;
        }

        let output = child.wait_with_output().await.context("waiting for command")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(task_id = %task.id, output = %stdout.trim(), "command output");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("`{}` exited with {}: {}", self.program, output.status, stderr.trim());
        }
        info!(task_id = %task.id, program = %self.program, "command finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        let task = Task::new("boefje-acme", 1, json!({"boefje": {"id": "dns"}}));

        let ok = CommandHandler::new("sh", ["-c", "grep -q dns"]);
        assert!(ok.handle(&task).await.is_ok());

        let failing = CommandHandler::new("sh", ["-c", "echo boom >&2; exit 3"]);
        let err = failing.handle(&task).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let task = Task::new("boefje-acme", 1, json!({}));
        let handler = CommandHandler::new("/nonexistent/prometheus-dispatch-handler", Vec::<String>::new());
        assert!(handler.handle(&task).await.is_err());
    }
}
