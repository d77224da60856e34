//! Worker pool manager configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::FilterRequest;

/// Settings of one worker pool manager process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub pool_size: usize,
    /// Sleep between polls when every queue was empty.
    pub poll_interval: Duration,
    /// Supervision tick and backpressure sleep.
    pub worker_heartbeat: Duration,
    /// Only queues named `<queue_kind>-...` are polled.
    pub queue_kind: String,
    /// Base URL of the scheduler API.
    pub scheduler_api: String,
    /// Timeout applied to every scheduler request.
    pub request_timeout: Duration,
    /// Per-worker join timeout at shutdown.
    pub shutdown_timeout: Duration,
    /// Sleep after a pop against one queue failed.
    pub queue_error_backoff: Duration,
    /// Stack size of worker threads, in bytes.
    pub thread_stack_size: usize,
    /// Filters sent with every pop.
    #[serde(default)]
    pub pop_filters: Option<FilterRequest>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
        _ => Ok(None),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, String> {
    env_parse::<f64>(key)?
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|e| format!("{key}: {e}"))
        })
        .transpose()
}

impl WorkerPoolConfig {
    /// Defaults: one worker per CPU, 10s poll interval, 1s heartbeat.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool_size: num_cpus::get().max(1),
            poll_interval: Duration::from_secs(10),
            worker_heartbeat: Duration::from_secs(1),
            queue_kind: "boefje".to_owned(),
            scheduler_api: "http://localhost:8004".to_owned(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
            queue_error_backoff: Duration::from_secs(10),
            thread_stack_size: 2 * 1024 * 1024,
            pop_filters: None,
        }
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the supervision heartbeat.
    #[must_use]
    pub const fn with_worker_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.worker_heartbeat = heartbeat;
        self
    }

    /// Set the polled task kind.
    #[must_use]
    pub fn with_queue_kind(mut self, kind: impl Into<String>) -> Self {
        self.queue_kind = kind.into();
        self
    }

    /// Set the scheduler base URL.
    #[must_use]
    pub fn with_scheduler_api(mut self, url: impl Into<String>) -> Self {
        self.scheduler_api = url.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the per-worker join timeout at shutdown.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the backoff after a failing queue.
    #[must_use]
    pub const fn with_queue_error_backoff(mut self, backoff: Duration) -> Self {
        self.queue_error_backoff = backoff;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Restrict pops to tasks matching `filters`.
    #[must_use]
    pub fn with_pop_filters(mut self, filters: FilterRequest) -> Self {
        self.pop_filters = Some(filters);
        self
    }

    /// Capacity of the local dispatch queue.
    #[must_use]
    pub const fn dispatch_capacity(&self) -> usize {
        self.pool_size + 1
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".into());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".into());
        }
        if self.worker_heartbeat.is_zero() {
            return Err("worker_heartbeat must be greater than 0".into());
        }
        if self.queue_kind.trim().is_empty() {
            return Err("queue_kind must not be empty".into());
        }
        if self.scheduler_api.trim().is_empty() {
            return Err("scheduler_api must not be empty".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Build from environment variables on top of the defaults, then validate.
    ///
    /// Reads `WORKER_POOL_SIZE`, `WORKER_POLL_INTERVAL`, `WORKER_HEARTBEAT`,
    /// `WORKER_QUEUE_KIND`, `SCHEDULER_API`, `OUTGOING_REQUEST_TIMEOUT`,
    /// `WORKER_SHUTDOWN_TIMEOUT`, `WORKER_QUEUE_ERROR_BACKOFF` (durations in
    /// seconds) and `WORKER_POP_FILTERS` (JSON filter request).
    ///
    /// # Errors
    ///
    /// Returns a description of the first unparsable or invalid value.
    pub fn from_env() -> Result<Self, String> {
        let mut cfg = Self::new();
        if let Some(size) = env_parse("WORKER_POOL_SIZE")? {
            cfg.pool_size = size;
        }
        if let Some(interval) = env_secs("WORKER_POLL_INTERVAL")? {
            cfg.poll_interval = interval;
        }
        if let Some(heartbeat) = env_secs("WORKER_HEARTBEAT")? {
            cfg.worker_heartbeat = heartbeat;
        }
        if let Some(kind) = env_parse::<String>("WORKER_QUEUE_KIND")? {
            cfg.queue_kind = kind;
        }
        if let Some(api) = env_parse::<String>("SCHEDULER_API")? {
            cfg.scheduler_api = api;
        }
        if let Some(timeout) = env_secs("OUTGOING_REQUEST_TIMEOUT")? {
            cfg.request_timeout = timeout;
        }
        if let Some(timeout) = env_secs("WORKER_SHUTDOWN_TIMEOUT")? {
            cfg.shutdown_timeout = timeout;
        }
        if let Some(backoff) = env_secs("WORKER_QUEUE_ERROR_BACKOFF")? {
            cfg.queue_error_backoff = backoff;
        }
        if let Ok(raw) = env::var("WORKER_POP_FILTERS") {
            if !raw.trim().is_empty() {
                let filters = serde_json::from_str(&raw)
                    .map_err(|e| format!("WORKER_POP_FILTERS: {e}"))?;
                cfg.pop_filters = Some(filters);
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = WorkerPoolConfig::new();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dispatch_capacity(), cfg.pool_size + 1);
        assert_eq!(cfg.queue_error_backoff, Duration::from_secs(10));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_builder_and_validation() {
        let cfg = WorkerPoolConfig::new()
            .with_pool_size(0)
            .with_queue_kind("normalizer");
        assert_eq!(cfg.validate().unwrap_err(), "pool_size must be greater than 0");

        let cfg = cfg.with_pool_size(3).with_poll_interval(Duration::ZERO);
        assert!(cfg.validate().unwrap_err().contains("poll_interval"));
    }
}
