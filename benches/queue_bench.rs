//! Benchmarks for the dispatch queues.
//!
//! Benchmarks cover:
//! - Push/pop through a deduplicating priority queue
//! - Duplicate detection under the update policies
//! - Filtered pops
//! - Content hashing

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use serde_json::{json, Value};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_dispatch::core::{
    FieldHasher, Filter, FilterOperator, FilterRequest, PriorityQueue, QueueOptions, Task,
    TaskHasher,
};
use prometheus_dispatch::infra::InMemoryQueueStore;

// ============================================================================
// Helper Functions
// ============================================================================

const QUEUE: &str = "boefje-bench";

fn build_queue(options: QueueOptions) -> PriorityQueue {
    PriorityQueue::new(
        QUEUE,
        options,
        Arc::new(FieldHasher::new(["boefje__id", "input_ooi"])),
        Arc::new(InMemoryQueueStore::new()),
    )
}

fn payload(id: u64) -> Value {
    json!({
        "boefje": {"id": if id % 2 == 0 { "dns-records" } else { "nmap" }},
        "input_ooi": format!("Hostname|internet|host-{id}.example.com"),
        "organization": "bench",
    })
}

fn random_priorities(count: u64) -> Vec<i64> {
    let mut rng = rand::rng();
    (0..count).map(|_| rng.random_range(1..=100)).collect()
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_pop");

    for size in [100_u64, 1_000] {
        let priorities = random_priorities(size);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let queue = build_queue(QueueOptions::default());
                for (i, priority) in (0..size).zip(&priorities) {
                    queue.push(Task::new(QUEUE, *priority, payload(i))).unwrap();
                }
                while let Ok(task) = queue.pop(None) {
                    black_box(task);
                }
            });
        });
    }

    group.finish();
}

fn bench_duplicate_pushes(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_duplicate_pushes");

    group.bench_function("rejected", |b| {
        let queue = build_queue(QueueOptions::default());
        for i in 0..500 {
            queue.push(Task::new(QUEUE, 5, payload(i))).unwrap();
        }
        let mut i = 0_u64;
        b.iter(|| {
            i = (i + 1) % 500;
            black_box(queue.push(Task::new(QUEUE, 5, payload(i))).is_err());
        });
    });

    group.bench_function("priority_update", |b| {
        let queue = build_queue(QueueOptions {
            allow_priority_updates: true,
            ..QueueOptions::default()
        });
        for i in 0..500 {
            queue.push(Task::new(QUEUE, 50, payload(i))).unwrap();
        }
        let mut rng = rand::rng();
        let mut i = 0_u64;
        b.iter(|| {
            i = (i + 1) % 500;
            let priority = rng.random_range(1..=100);
            black_box(queue.push(Task::new(QUEUE, priority, payload(i))).ok());
        });
    });

    group.finish();
}

fn bench_filtered_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_filtered_pop");
    let filters = FilterRequest::from(vec![Filter::new(
        "payload",
        Some("boefje__id"),
        FilterOperator::Eq,
        json!("nmap"),
    )]);

    group.bench_function("half_match", |b| {
        b.iter(|| {
            let queue = build_queue(QueueOptions::default());
            for i in 0..200 {
                queue.push(Task::new(QUEUE, 3, payload(i))).unwrap();
            }
            while let Ok(task) = queue.pop(Some(&filters)) {
                black_box(task);
            }
        });
    });

    group.finish();
}

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_hashing");
    let doc = payload(42);
    let fields = FieldHasher::new(["boefje__id", "input_ooi"]);
    let whole = FieldHasher::whole_payload();

    group.bench_function("selected_fields", |b| b.iter(|| black_box(fields.hash(&doc))));
    group.bench_function("whole_payload", |b| b.iter(|| black_box(whole.hash(&doc))));

    group.finish();
}

criterion_group!(queue_benches, bench_push_pop, bench_duplicate_pushes, bench_filtered_pop);
criterion_group!(hash_benches, bench_hashing);
criterion_main!(queue_benches, hash_benches);
