//! Builders to construct the scheduler service from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::{SchedulerConfig, StoreBackendConfig};
use crate::core::{
    FieldHasher, QueueStore, SchedulerError, SchedulerService, TaskHasher, TracingAuditSink,
};
use crate::infra::{FileQueueStore, InMemoryQueueStore};

/// Open the store backend selected by the configuration.
///
/// # Errors
///
/// Returns `SchedulerError::Backend` if the configuration is invalid or the
/// file store cannot be opened.
pub fn build_store(cfg: &SchedulerConfig) -> Result<Arc<dyn QueueStore>, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;

    match cfg.store {
        StoreBackendConfig::InMemory => {
            info!("using in-memory queue store");
            Ok(Arc::new(InMemoryQueueStore::new()))
        }
        StoreBackendConfig::File => {
            let path = cfg.store_path.as_deref().unwrap_or_default();
            info!(path, "using file queue store");
            Ok(Arc::new(FileQueueStore::open(path)?))
        }
    }
}

/// Build a scheduler over `store` with every configured queue registered.
///
/// # Errors
///
/// Returns `SchedulerError::Backend` if the configuration is invalid.
pub fn build_scheduler(
    cfg: &SchedulerConfig,
    store: Arc<dyn QueueStore>,
) -> Result<SchedulerService, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;

    let mut service = SchedulerService::new(store);
    if cfg.audit_log {
        service = service.with_audit(Arc::new(TracingAuditSink));
    }
    for queue in &cfg.queues {
        let hasher: Arc<dyn TaskHasher> = Arc::new(FieldHasher::new(queue.hash_fields.iter().cloned()));
        service.register_queue(&queue.organisation, &queue.kind, queue.options(), hasher);
    }
    Ok(service)
}
