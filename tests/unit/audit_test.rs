//! Tests for audit sink

use std::sync::Arc;

use prometheus_dispatch::core::{
    build_audit_event, AuditSink, FieldHasher, InMemoryAuditSink, QueueOptions, SchedulerService,
    Task, TaskStatus,
};
use prometheus_dispatch::infra::InMemoryQueueStore;
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let task_id = Uuid::new_v4();

    sink.record(build_audit_event(task_id, "boefje-acme", "push", Some("queued".to_string())));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].task_id, task_id);
    assert_eq!(events[0].queue_id, "boefje-acme");
    assert_eq!(events[0].action, "push");
    assert_eq!(events[0].detail.as_deref(), Some("queued"));
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for id in &ids {
        sink.record(build_audit_event(*id, "boefje-acme", "push", None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, ids[1]);
    assert_eq!(events[1].task_id, ids[2]);

    let disabled = InMemoryAuditSink::new(0);
    disabled.record(build_audit_event(ids[0], "boefje-acme", "push", None));
    assert!(disabled.events().is_empty());
}

#[test]
fn test_scheduler_records_task_lifecycle() {
    let sink = InMemoryAuditSink::new(100);
    let service = SchedulerService::new(Arc::new(InMemoryQueueStore::new()))
        .with_audit(Arc::new(sink.clone()));
    service.register_queue("acme", "boefje", QueueOptions::default(), Arc::new(FieldHasher::whole_payload()));

    let task = service
        .push("boefje-acme", Task::new("boefje-acme", 2, json!({"target": "a"})))
        .unwrap();
    service.pop("boefje-acme", None, 1).unwrap();
    service.patch_status(task.id, TaskStatus::Running).unwrap();
    service.patch_status(task.id, TaskStatus::Completed).unwrap();

    let actions: Vec<(String, Option<String>)> = sink
        .events_for(task.id)
        .into_iter()
        .map(|e| (e.action, e.detail))
        .collect();
    assert_eq!(
        actions,
        [
            ("push".to_string(), Some("queued".to_string())),
            ("dispatch".to_string(), None),
            ("status".to_string(), Some("running".to_string())),
            ("status".to_string(), Some("completed".to_string())),
        ]
    );
}
