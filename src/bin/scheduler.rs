//! Scheduler process: owns the queues and serves the HTTP API.
//!
//! Reads its configuration from the JSON file named by `SCHEDULER_CONFIG`
//! (default `scheduler.json`). A `.env` file is honoured.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use prometheus_dispatch::builders::{build_scheduler, build_store};
use prometheus_dispatch::config::SchedulerConfig;
use prometheus_dispatch::runtime::router;
use prometheus_dispatch::util::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let path = std::env::var("SCHEDULER_CONFIG").unwrap_or_else(|_| "scheduler.json".to_owned());
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading scheduler config {path}"))?;
    let cfg = SchedulerConfig::from_json_str(&raw).map_err(|e| anyhow!("{path}: {e}"))?;

    let store = build_store(&cfg)?;
    let service = Arc::new(build_scheduler(&cfg, store)?);
    info!(
        queues = cfg.queues.len(),
        store = ?cfg.store,
        audit_log = cfg.audit_log,
        "scheduler configured"
    );

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let signal = shutdown_signal().await;
            info!(signal, "shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
