//! Benchmarks for filtered scans.
//!
//! Benchmark targets:
//! - Newest-first page over 10k entries: <1ms (memory)
//! - Two-filter scan over 10k entries: <5ms (memory), <20ms (`SQLite`)
//! - Count over 10k entries: <5ms

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use auditlog::storage::{MemoryBackend, SqliteBackend};
use auditlog::{ContentTypes, Entry, Filter, Level, StorageBackend};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const SIZES: [usize; 2] = [1_000, 10_000];

fn entries(n: usize) -> Vec<Entry> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            Entry::new(format!("type-{}", i % 16), Level::ALL[i % Level::ALL.len()])
                .with_timestamp(base + ChronoDuration::seconds(i64::try_from(i).unwrap()))
                .with_user_id(format!("user-{}", i % 50))
                .with_field("n", i)
        })
        .collect()
}

fn memory_backend(n: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    assert!(backend.store_many(entries(n)).is_complete());
    backend
}

fn sqlite_backend(n: usize) -> SqliteBackend {
    let backend = SqliteBackend::in_memory(Arc::new(ContentTypes::new())).unwrap();
    assert!(backend.store_many(entries(n)).is_complete());
    backend
}

fn filters() -> Vec<Filter> {
    vec![
        Filter::types(["type-1", "type-2", "type-7"]),
        Filter::level_gt(Level::Info),
    ]
}

fn bench_backend(c: &mut Criterion, name: &str, backend: &dyn StorageBackend, size: usize) {
    let mut group = c.benchmark_group(name);
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(size as u64));
    let filters = filters();

    group.bench_with_input(BenchmarkId::new("retrieve_many", size), &size, |b, _| {
        b.iter(|| backend.retrieve_many(black_box(20), black_box(100)).unwrap());
    });

    group.bench_with_input(BenchmarkId::new("entry_filter", size), &size, |b, _| {
        b.iter(|| backend.entry_filter(black_box(&filters), 20, 0).unwrap());
    });

    group.bench_with_input(BenchmarkId::new("count_filter", size), &size, |b, _| {
        b.iter(|| backend.count_filter(black_box(&filters)).unwrap());
    });

    group.finish();
}

fn bench_memory(c: &mut Criterion) {
    for size in SIZES {
        let backend = memory_backend(size);
        bench_backend(c, "memory_scan", &backend, size);
    }
}

fn bench_sqlite(c: &mut Criterion) {
    for size in SIZES {
        let backend = sqlite_backend(size);
        bench_backend(c, "sqlite_scan", &backend, size);
    }
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.bench_function("memory", |b| {
        let backend = MemoryBackend::new();
        b.iter(|| backend.store(black_box(Entry::new("bench", Level::Info))).unwrap());
    });
    group.bench_function("sqlite", |b| {
        let backend = SqliteBackend::in_memory(Arc::new(ContentTypes::new())).unwrap();
        b.iter(|| backend.store(black_box(Entry::new("bench", Level::Info))).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_memory, bench_sqlite, bench_store);
criterion_main!(benches);
