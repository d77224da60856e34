//! Tests for error types

use prometheus_dispatch::core::{ClientError, SchedulerError, TaskStatus};
use uuid::Uuid;

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("boefje-acme".to_string());
    assert_eq!(format!("{}", err), "queue full: boefje-acme");
    assert_eq!(err.kind(), "queue_full");
}

#[test]
fn test_invalid_transition_error() {
    let err = SchedulerError::InvalidTransition {
        from: TaskStatus::Queued,
        to: TaskStatus::Completed,
    };
    assert_eq!(format!("{}", err), "invalid status transition from queued to completed");
    assert_eq!(err.kind(), "invalid_transition");
}

#[test]
fn test_unknown_queue_error() {
    let err = SchedulerError::NoQueuesAvailable("normalizer-acme".to_string());
    assert_eq!(format!("{}", err), "queue not found: normalizer-acme");
    assert_eq!(err.kind(), "queue_not_found");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("disk full".to_string());
    assert_eq!(format!("{}", err), "backend error: disk full");
}

#[test]
fn test_client_error_classification() {
    let missing = ClientError::from(SchedulerError::TaskNotFound(Uuid::nil()));
    assert!(missing.is_not_found());
    assert!(!missing.is_transient());

    let gateway = ClientError::Status {
        code: 502,
        body: "bad gateway".to_string(),
    };
    assert!(gateway.is_transient());
    assert_eq!(format!("{}", gateway), "scheduler returned 502: bad gateway");

    assert!(ClientError::Transport("reset".to_string()).is_transient());
    assert!(!ClientError::Decode("eof".to_string()).is_transient());
}
