//! Micro-benchmarks for the core engine operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use lsmkv::engine::{Engine, EngineConfig};
use tempfile::TempDir;

fn value_128b() -> String {
    "x".repeat(128)
}

fn value_1k() -> String {
    "x".repeat(1024)
}

fn make_key(i: u64) -> String {
    format!("key-{i:012}")
}

/// Open a fresh engine with a small flush threshold so flushes happen
/// quickly during sustained-write benchmarks.
fn open_small_buffer(dir: &std::path::Path) -> Engine {
    Engine::open(
        dir,
        EngineConfig {
            flush_threshold: 64,
            ..EngineConfig::default()
        },
    )
    .expect("open")
}

/// Open an engine with a flush threshold high enough that all data for a
/// single benchmark iteration stays in the active memtable.
fn open_memtable_only(dir: &std::path::Path) -> Engine {
    Engine::open(
        dir,
        EngineConfig {
            flush_threshold: 1_000_000,
            ..EngineConfig::default()
        },
    )
    .expect("open")
}

/// Pre-populate an engine with `count` sequential keys and close it, so
/// sorted runs exist on disk.
fn prepopulate(dir: &std::path::Path, count: u64, value: &str) {
    let engine = open_small_buffer(dir);
    for i in 0..count {
        engine.set(make_key(i), value).unwrap();
    }
    engine.close().unwrap();
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memtable_only/128B", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_memtable_only(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            engine.set(make_key(i), black_box(value_128b())).unwrap();
            i += 1;
        });
        engine.close().unwrap();
    });

    group.bench_function("memtable_only/1K", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_memtable_only(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            engine.set(make_key(i), black_box(value_1k())).unwrap();
            i += 1;
        });
        engine.close().unwrap();
    });

    group.bench_function("with_flushes/128B", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_small_buffer(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            engine.set(make_key(i), black_box(value_128b())).unwrap();
            i += 1;
        });
        engine.close().unwrap();
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memtable_hit", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_memtable_only(dir.path());
        for i in 0..10_000u64 {
            engine.set(make_key(i), value_128b()).unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(make_key(i % 10_000)).unwrap());
            i += 1;
        });
        engine.close().unwrap();
    });

    group.bench_function("sorted_run_hit", |b| {
        let dir = TempDir::new().unwrap();
        prepopulate(dir.path(), 10_000, &value_128b());
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(make_key(i % 10_000)).unwrap());
            i += 1;
        });
        engine.close().unwrap();
    });

    group.bench_function("miss", |b| {
        let dir = TempDir::new().unwrap();
        prepopulate(dir.path(), 10_000, &value_128b());
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(format!("absent-{i}")).unwrap());
            i += 1;
        });
        engine.close().unwrap();
    });

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memtable_only", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_memtable_only(dir.path());
        for i in 0..100_000u64 {
            engine.set(make_key(i), value_128b()).unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            engine.delete(make_key(i)).unwrap();
            i += 1;
        });
        engine.close().unwrap();
    });

    group.finish();
}

fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");

    for &count in &[1_000u64, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
                    for i in 0..count {
                        engine.set(make_key(i), value_128b()).unwrap();
                    }
                    // No close(): leaves the WAL populated for replay.
                    dir
                },
                |dir| {
                    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
                    black_box(engine.get(make_key(0)).unwrap());
                    engine.close().unwrap();
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(10);

    group.bench_function("merge_four_runs", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let config = EngineConfig {
                    flush_threshold: 2_500,
                    compaction_threshold: usize::MAX, // disable periodic compaction
                    ..EngineConfig::default()
                };
                let engine = Engine::open(dir.path(), config).unwrap();
                for i in 0..10_000u64 {
                    engine.set(make_key(i), value_128b()).unwrap();
                }
                engine.close().unwrap();
                dir
            },
            |dir| {
                let config = EngineConfig {
                    compaction_threshold: 2,
                    ..EngineConfig::default()
                };
                let engine = Engine::open(dir.path(), config).unwrap();
                engine.compact().unwrap();
                engine.close().unwrap();
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_value_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_sizes");
    for &size in &[16usize, 128, 1024, 8192] {
        let value: String = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            let dir = TempDir::new().unwrap();
            let engine = open_memtable_only(dir.path());
            let mut i = 0u64;
            b.iter(|| {
                engine.set(make_key(i), black_box(value.as_str())).unwrap();
                i += 1;
            });
            engine.close().unwrap();
        });
    }
    group.finish();
}

fn bench_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("close");
    group.sample_size(10);

    group.bench_function("flush_on_close", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_small_buffer(dir.path());
                for i in 0..5_000u64 {
                    engine.set(make_key(i), value_128b()).unwrap();
                }
                engine
            },
            |engine| {
                engine.close().unwrap();
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_delete,
    bench_recovery,
    bench_compaction,
    bench_value_sizes,
    bench_close,
);
criterion_main!(benches);
