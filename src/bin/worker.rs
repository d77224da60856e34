//! Worker pool process: pulls tasks of one kind from the scheduler and runs
//! `WORKER_COMMAND` for each.
//!
//! Exits 0 after a signal-triggered shutdown and 1 when polling fails.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tracing::{error, info, warn};

use prometheus_dispatch::config::WorkerPoolConfig;
use prometheus_dispatch::core::{SchedulerClient, WorkerPoolManager};
use prometheus_dispatch::runtime::{CommandHandler, HttpSchedulerClient};
use prometheus_dispatch::util::{init_tracing, retry_async, shutdown_signal};

const HEALTH_ATTEMPTS: u32 = 10;
const HEALTH_DELAY: Duration = Duration::from_secs(1);

async fn wait_for_scheduler(client: &Arc<HttpSchedulerClient>) -> bool {
    retry_async(
        || {
            let client = Arc::clone(client);
            async move {
                match client.health().await {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(error = %e, api = %client.base_url(), "scheduler not reachable");
                        false
                    }
                }
            }
        },
        HEALTH_ATTEMPTS,
        HEALTH_DELAY,
    )
    .await
}

async fn run() -> Result<()> {
    let config = WorkerPoolConfig::from_env().map_err(|e| anyhow!("worker config: {e}"))?;
    let client = Arc::new(HttpSchedulerClient::new(
        config.scheduler_api.clone(),
        config.request_timeout,
    )?);
    if !wait_for_scheduler(&client).await {
        bail!("scheduler at {} is not healthy", config.scheduler_api);
    }

    let handler = Arc::new(CommandHandler::from_env()?);
    info!(program = handler.program(), "tasks run through command");
    let manager = WorkerPoolManager::new(config, client, handler)?;

    let shutdown = manager.shutdown_handle();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!(signal, "shutdown signal received");
        shutdown.trigger();
    });

    manager.run().await?;
    info!(stats = ?manager.stats(), "worker pool stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "worker pool failed");
            ExitCode::FAILURE
        }
    }
}
