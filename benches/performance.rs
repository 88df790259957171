//! Performance benchmarks for the broker.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fanlog::{
    Broker, BrokerConfig, ChannelTransport, CreatedAt, FileStore, FileStoreConfig, MemoryStore,
    RecordStore,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn memory_broker() -> (Broker, Arc<ChannelTransport>) {
    let transport = Arc::new(ChannelTransport::with_buffer_size(1_000_000));
    let broker = Broker::new(
        BrokerConfig::default(),
        Arc::new(MemoryStore::new()),
        transport.clone(),
    );
    (broker, transport)
}

fn file_broker(dir: &TempDir, sync_interval: u64) -> Broker {
    let store = FileStore::create(FileStoreConfig {
        path: dir.path().join("store"),
        create_if_missing: true,
        sync_interval,
    })
    .unwrap();
    Broker::new(
        BrokerConfig::default(),
        Arc::new(store),
        Arc::new(ChannelTransport::new()),
    )
}

/// Benchmark publish with varying subscriber counts
fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    let payload = serde_json::to_vec(&json!({"text": "hello"})).unwrap();

    for subscribers in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let (broker, transport) = memory_broker();
                // Handles stay alive so pushes succeed.
                let handles: Vec<_> = (0..count)
                    .map(|i| {
                        let handle = transport.connect_as(format!("c{i}"));
                        broker.subscribe("room1", &handle.id, None).unwrap();
                        handle
                    })
                    .collect();

                b.iter(|| {
                    black_box(broker.publish("room1", "p", &payload).unwrap());
                    for handle in &handles {
                        while handle.try_recv().is_ok() {}
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark durable append on the file store
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");

    for sync_interval in [1, 100] {
        group.bench_with_input(
            BenchmarkId::new("sync_interval", sync_interval),
            &sync_interval,
            |b, &interval| {
                let dir = TempDir::new().unwrap();
                let broker = file_broker(&dir, interval);

                b.iter(|| {
                    black_box(broker.publish("room1", "p", b"\"event\"").unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark catch-up queries with varying log lengths
fn bench_catch_up_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("catch_up_query");

    for length in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("log_length", length), &length, |b, &len| {
            let (broker, _) = memory_broker();
            let mut keys = Vec::with_capacity(len);
            for i in 0..len {
                let payload = format!("{}", i);
                keys.push(broker.publish("room1", "p", payload.as_bytes()).unwrap().created_at);
            }
            // Replay the most recent tenth.
            let cursor: CreatedAt = keys[len - len / 10];

            b.iter(|| {
                black_box(broker.log().query("room1", Some(cursor)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark reopening a file store
fn bench_file_reopen(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    {
        let broker = file_broker(&dir, 1000);
        for i in 0..10000 {
            broker
                .publish(&format!("room{}", i % 10), "p", b"1")
                .unwrap();
        }
    }

    c.bench_function("file_reopen_10k", |b| {
        b.iter(|| {
            let store = FileStore::open(FileStoreConfig {
                path: dir.path().join("store"),
                create_if_missing: false,
                sync_interval: 1,
            })
            .unwrap();
            black_box(store.query_range(fanlog::Table::Messages, "room0", None).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_file_append,
    bench_catch_up_query,
    bench_file_reopen,
);
criterion_main!(benches);
