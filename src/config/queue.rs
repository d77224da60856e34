//! Scheduler and queue configuration structures.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::{queue_id_for, QueueOptions};

/// Queue store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// JSON-lines files, one per queue.
    File,
}

/// One queue: an organisation × task kind pair and its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Organisation the queue serves.
    pub organisation: String,
    /// Task kind (`boefje`, `normalizer`, ...).
    pub kind: String,
    /// Maximum queued tasks; 0 means unbounded.
    #[serde(default)]
    pub max_size: usize,
    /// Accept any duplicate push.
    #[serde(default)]
    pub allow_replace: bool,
    /// Accept duplicates whose payload changed.
    #[serde(default)]
    pub allow_updates: bool,
    /// Accept duplicates whose priority changed.
    #[serde(default)]
    pub allow_priority_updates: bool,
    /// Payload paths identifying a unit of work; empty hashes the whole payload.
    #[serde(default)]
    pub hash_fields: Vec<String>,
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Store backend.
    #[serde(default)]
    pub store: StoreBackendConfig,
    /// Directory of the file store.
    #[serde(default)]
    pub store_path: Option<String>,
    /// Queues to register at startup.
    pub queues: Vec<QueueConfig>,
    /// Emit push, dispatch and status events on the `audit` tracing target.
    #[serde(default = "default_audit_log")]
    pub audit_log: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8004".to_owned()
}

const fn default_audit_log() -> bool {
    true
}

impl QueueConfig {
    /// Queue id, `<kind>-<organisation>`.
    #[must_use]
    pub fn queue_id(&self) -> String {
        queue_id_for(&self.kind, &self.organisation)
    }

    /// Size limit and policy.
    #[must_use]
    pub const fn options(&self) -> QueueOptions {
        QueueOptions {
            max_size: self.max_size,
            allow_replace: self.allow_replace,
            allow_updates: self.allow_updates,
            allow_priority_updates: self.allow_priority_updates,
        }
    }

    /// Validate queue configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.organisation.trim().is_empty() {
            return Err("organisation must not be empty".into());
        }
        if self.kind.trim().is_empty() {
            return Err("kind must not be empty".into());
        }
        if self.kind.contains('-') {
            return Err("kind must not contain `-`".into());
        }
        if self.hash_fields.iter().any(|f| f.trim().is_empty()) {
            return Err("hash_fields must not contain empty paths".into());
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate all queues and ensure at least one queue exists.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.queues.is_empty() {
            return Err("at least one queue must be defined".into());
        }
        if self.store == StoreBackendConfig::File
            && self.store_path.as_deref().is_none_or(|p| p.trim().is_empty())
        {
            return Err("store_path is required for the file store".into());
        }
        let mut seen = HashSet::new();
        for queue in &self.queues {
            let id = queue.queue_id();
            queue.validate().map_err(|e| format!("queue `{id}` invalid: {e}"))?;
            if !seen.insert(id.clone()) {
                return Err(format!("queue `{id}` defined twice"));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns parse or validation errors as text.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
