//! Tests for configuration validation

use std::time::Duration;

use prometheus_dispatch::config::{QueueConfig, SchedulerConfig, StoreBackendConfig, WorkerPoolConfig};

fn queue(organisation: &str, kind: &str) -> QueueConfig {
    QueueConfig {
        organisation: organisation.to_string(),
        kind: kind.to_string(),
        max_size: 100,
        allow_replace: false,
        allow_updates: true,
        allow_priority_updates: true,
        hash_fields: vec!["boefje__id".to_string(), "input_ooi".to_string()],
    }
}

#[test]
fn test_queue_config_validation() {
    let valid = queue("acme", "boefje");
    assert!(valid.validate().is_ok());
    assert_eq!(valid.queue_id(), "boefje-acme");
    assert_eq!(valid.options().max_size, 100);
    assert!(valid.options().allow_updates);
}

#[test]
fn test_queue_config_invalid_kind() {
    assert!(queue("acme", "").validate().is_err());
    assert!(queue("acme", "boefje-v2").validate().is_err());
    assert!(queue(" ", "boefje").validate().is_err());
}

#[test]
fn test_scheduler_config_requires_queues() {
    let cfg = SchedulerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        store: StoreBackendConfig::InMemory,
        store_path: None,
        queues: vec![],
        audit_log: true,
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scheduler_config_rejects_duplicate_queues() {
    let cfg = SchedulerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        store: StoreBackendConfig::InMemory,
        store_path: None,
        queues: vec![queue("acme", "boefje"), queue("acme", "boefje")],
        audit_log: true,
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("boefje-acme"));
}

#[test]
fn test_file_store_requires_path() {
    let mut cfg = SchedulerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        store: StoreBackendConfig::File,
        store_path: None,
        queues: vec![queue("acme", "boefje")],
        audit_log: false,
    };
    assert!(cfg.validate().is_err());
    cfg.store_path = Some("/var/lib/dispatch".to_string());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "store": "file",
        "store_path": "/tmp/dispatch",
        "queues": [
            {"organisation": "acme", "kind": "boefje", "max_size": 10, "hash_fields": ["boefje__id"]},
            {"organisation": "acme", "kind": "normalizer"}
        ]
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8004");
    assert_eq!(cfg.store, StoreBackendConfig::File);
    assert_eq!(cfg.queues.len(), 2);
    assert_eq!(cfg.queues[1].max_size, 0);
    assert!(cfg.queues[1].hash_fields.is_empty());
    assert!(cfg.audit_log);

    assert!(SchedulerConfig::from_json_str(r#"{"queues": []}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_worker_config_builder() {
    let cfg = WorkerPoolConfig::new()
        .with_pool_size(4)
        .with_queue_kind("normalizer")
        .with_poll_interval(Duration::from_millis(250));
    assert_eq!(cfg.pool_size, 4);
    assert_eq!(cfg.dispatch_capacity(), 5);
    assert!(cfg.validate().is_ok());

    assert!(cfg.clone().with_pool_size(0).validate().is_err());
    assert!(cfg.with_queue_kind("").validate().is_err());
}

#[test]
fn test_worker_config_from_env() {
    std::env::set_var("WORKER_POOL_SIZE", "3");
    std::env::set_var("WORKER_POLL_INTERVAL", "0.5");
    std::env::set_var("WORKER_QUEUE_KIND", "normalizer");
    std::env::set_var("WORKER_POP_FILTERS", r#"[{"column": "payload", "field": "boefje__id", "value": "dns"}]"#);

    let cfg = WorkerPoolConfig::from_env().unwrap();
    assert_eq!(cfg.pool_size, 3);
    assert_eq!(cfg.poll_interval, Duration::from_millis(500));
    assert_eq!(cfg.queue_kind, "normalizer");
    assert!(cfg.pop_filters.is_some());

    std::env::set_var("WORKER_POOL_SIZE", "many");
    assert!(WorkerPoolConfig::from_env().is_err());

    for key in ["WORKER_POOL_SIZE", "WORKER_POLL_INTERVAL", "WORKER_QUEUE_KIND", "WORKER_POP_FILTERS"] {
        std::env::remove_var(key);
    }
}
