//! Tests for utility functions

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use prometheus_dispatch::util::{retry, retry_async};

#[test]
fn test_retry_gives_up_after_max_attempts() {
    let mut calls = 0;
    assert!(!retry(
        || {
            calls += 1;
            false
        },
        3,
        Duration::ZERO,
    ));
    assert_eq!(calls, 3);
}

#[test]
fn test_retry_zero_attempts_never_calls() {
    let mut called = false;
    assert!(!retry(
        || {
            called = true;
            true
        },
        0,
        Duration::ZERO,
    ));
    assert!(!called);
}

#[tokio::test]
async fn test_retry_async_succeeds_eventually() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let ok = retry_async(
        || async move { calls.fetch_add(1, Ordering::SeqCst) >= 1 },
        5,
        Duration::from_millis(1),
    )
    .await;
    assert!(ok);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}
