//! Tests for builder modules

use prometheus_dispatch::builders::{build_scheduler, build_store};
use prometheus_dispatch::config::{QueueConfig, SchedulerConfig, StoreBackendConfig};
use prometheus_dispatch::core::{QueueStore, SchedulerError, Task};
use serde_json::json;

fn config(store: StoreBackendConfig, store_path: Option<String>) -> SchedulerConfig {
    SchedulerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        store,
        store_path,
        queues: vec![
            QueueConfig {
                organisation: "acme".to_string(),
                kind: "boefje".to_string(),
                max_size: 10,
                allow_replace: false,
                allow_updates: false,
                allow_priority_updates: false,
                hash_fields: vec!["boefje__id".to_string(), "input_ooi".to_string()],
            },
            QueueConfig {
                organisation: "acme".to_string(),
                kind: "normalizer".to_string(),
                max_size: 0,
                allow_replace: true,
                allow_updates: false,
                allow_priority_updates: false,
                hash_fields: vec![],
            },
        ],
        audit_log: true,
    }
}

#[test]
fn test_build_scheduler_registers_queues() {
    let cfg = config(StoreBackendConfig::InMemory, None);
    let store = build_store(&cfg).unwrap();
    let service = build_scheduler(&cfg, store).unwrap();

    let ids: Vec<String> = service.list_queues().unwrap().into_iter().map(|q| q.id).collect();
    assert_eq!(ids, ["boefje-acme", "normalizer-acme"]);

    let boefje = service.snapshot("boefje-acme").unwrap();
    assert_eq!(boefje.max_size, 10);
    assert!(service.snapshot("normalizer-acme").unwrap().allow_replace);
}

#[test]
fn test_build_scheduler_attaches_audit_log() {
    let mut cfg = config(StoreBackendConfig::InMemory, None);
    assert!(build_scheduler(&cfg, build_store(&cfg).unwrap()).unwrap().is_audited());

    cfg.audit_log = false;
    assert!(!build_scheduler(&cfg, build_store(&cfg).unwrap()).unwrap().is_audited());
}

#[test]
fn test_built_queue_hashes_configured_fields() {
    let cfg = config(StoreBackendConfig::InMemory, None);
    let service = build_scheduler(&cfg, build_store(&cfg).unwrap()).unwrap();

    let payload = json!({"boefje": {"id": "dns"}, "input_ooi": "Hostname|internet|example.com"});
    service
        .push("boefje-acme", Task::new("boefje-acme", 3, payload))
        .unwrap();

    // Same identifying fields, different noise: still a duplicate.
    let noisy = json!({"boefje": {"id": "dns"}, "input_ooi": "Hostname|internet|example.com", "note": 1});
    let err = service
        .push("boefje-acme", Task::new("boefje-acme", 3, noisy))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotAllowed(_)));
}

#[test]
fn test_build_file_store() {
    let dir = std::env::temp_dir().join(format!("dispatch-builder-{}", uuid::Uuid::new_v4()));
    let cfg = config(StoreBackendConfig::File, Some(dir.to_string_lossy().into_owned()));
    let store = build_store(&cfg).unwrap();
    assert!(store.queue_ids().unwrap().is_empty());
    assert!(dir.is_dir());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut cfg = config(StoreBackendConfig::InMemory, None);
    cfg.queues.clear();
    assert!(matches!(build_store(&cfg), Err(SchedulerError::Backend(_))));
}
