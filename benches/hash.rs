//! Benchmarks for engine hot paths.
//!
//! - Key hashing across representative key lengths
//! - Engine get (lookup + lazy-expiry checks + copy out)
//! - Engine insert (allocation + link, including overwrite)
//!
//! Run with: cargo bench --bench hash

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slabkv::{hash, CacheEngine, EngineConfig};

fn make_key(index: usize) -> Vec<u8> {
    format!("key:{:016x}", index).into_bytes()
}

fn make_value(size: usize) -> Vec<u8> {
    vec![0xAB; size]
}

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");

    for key_len in [4, 12, 21, 64, 250] {
        let key = vec![0x5A; key_len];
        group.throughput(Throughput::Bytes(key_len as u64));
        group.bench_with_input(BenchmarkId::new("hashlittle", key_len), &key, |b, key| {
            b.iter(|| black_box(hash(black_box(key), 0)));
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/get");

    for (num_items, value_size) in [(10_000, 64), (100_000, 64), (10_000, 1024)] {
        let heap = (num_items * (value_size + 128) * 2).max(64 * 1024 * 1024);
        let engine = CacheEngine::new(EngineConfig {
            memory_limit: heap,
            ..Default::default()
        });

        let value = make_value(value_size);
        let keys: Vec<Vec<u8>> = (0..num_items).map(make_key).collect();
        for key in &keys {
            engine.insert(key, &value, 0, 0).unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("hit", format!("{num_items}items_{value_size}B")),
            &num_items,
            |b, _| {
                let mut idx = 0usize;
                b.iter(|| {
                    let result = engine.get(black_box(&keys[idx]));
                    debug_assert!(result.is_some());
                    black_box(result);
                    idx = (idx + 1) % keys.len();
                });
            },
        );
    }

    let engine = CacheEngine::new(EngineConfig::default());
    for i in 0..10_000 {
        engine.insert(&make_key(i), &make_value(64), 0, 0).unwrap();
    }
    let miss_keys: Vec<Vec<u8>> = (10_000..20_000).map(make_key).collect();

    group.throughput(Throughput::Elements(1));
    group.bench_function("miss", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let result = engine.get(black_box(&miss_keys[idx]));
            debug_assert!(result.is_none());
            black_box(result);
            idx = (idx + 1) % miss_keys.len();
        });
    });

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/insert");

    for value_size in [64, 256, 1024] {
        let engine = CacheEngine::new(EngineConfig {
            memory_limit: 256 * 1024 * 1024,
            ..Default::default()
        });
        let value = make_value(value_size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("new_key", format!("{value_size}B")),
            &value_size,
            |b, _| {
                let mut idx = 0usize;
                b.iter(|| {
                    let key = make_key(idx);
                    let _ = engine.insert(black_box(&key), black_box(&value), 0, 0);
                    idx = idx.wrapping_add(1);
                });
            },
        );
    }

    // overwrite: allocation plus displacement of the old record
    let engine = CacheEngine::new(EngineConfig::default());
    let keys: Vec<Vec<u8>> = (0..10_000).map(make_key).collect();
    let value = make_value(64);
    for key in &keys {
        engine.insert(key, &value, 0, 0).unwrap();
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("overwrite", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let _ = engine.insert(black_box(&keys[idx]), black_box(&value), 0, 0);
            idx = (idx + 1) % keys.len();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hash, bench_get, bench_insert);
criterion_main!(benches);
