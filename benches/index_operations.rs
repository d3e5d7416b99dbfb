//! Benchmarks for the persistent collections
//!
//! - OrderedMap: insert, get, full iteration
//! - MultiKeyIndex: add with composite keys, point lookup, prefix scan
//!
//! Run: cargo bench --bench index_operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sdb::collections::{MultiKeyIndex, OrderedMap, TreeBehaviour, TreeInfo};
use sdb::Value;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Two-level index: `(i % 100, i)`, unique on the full key.
fn make_index(size: usize) -> MultiKeyIndex {
    let mut index = MultiKeyIndex::new(vec![
        TreeInfo::ordering(true),
        TreeInfo::new(TreeBehaviour::Disallow, TreeBehaviour::Disallow, true),
    ]);
    for i in 0..size as i64 {
        index = index.add(&key(i), i).unwrap();
    }
    index
}

fn key(i: i64) -> [Value; 2] {
    [Value::int(i % 100), Value::int(i)]
}

fn make_map(size: usize) -> OrderedMap<i64, i64> {
    (0..size as i64).fold(OrderedMap::new(), |m, i| m.insert(i * 7919 % size as i64, i))
}

// ---------------------------------------------------------------------------
// OrderedMap
// ---------------------------------------------------------------------------

fn bench_map_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_insert");

    for size in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(make_map(size)));
        });
    }

    group.finish();
}

fn bench_map_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_get");

    for size in [1000, 10000, 100000] {
        let map = make_map(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut i = 0i64;
            b.iter(|| {
                i = (i + 31) % size as i64;
                black_box(map.get(black_box(&i)));
            });
        });
    }

    group.finish();
}

fn bench_map_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_iterate");

    for size in [1000, 10000] {
        let map = make_map(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(map.iter().map(|(_, v)| *v).sum::<i64>()));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// MultiKeyIndex
// ---------------------------------------------------------------------------

fn bench_index_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_add");

    for size in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(make_index(size)));
        });
    }

    group.finish();
}

fn bench_index_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_lookup");

    for size in [1000, 10000, 100000] {
        let index = make_index(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut i = 0i64;
            b.iter(|| {
                i = (i + 97) % size as i64;
                black_box(index.lookup(black_box(&key(i))));
            });
        });
    }

    group.finish();
}

fn bench_index_prefix_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_prefix_scan");

    for size in [1000, 10000, 100000] {
        let index = make_index(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut n = 0usize;
                let mut cursor = index.position_at(black_box(&[Value::int(42)]));
                while let Some(c) = cursor {
                    n += 1;
                    cursor = c.next();
                }
                black_box(n)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_map_insert,
    bench_map_get,
    bench_map_iterate,
    bench_index_add,
    bench_index_lookup,
    bench_index_prefix_scan,
);
criterion_main!(benches);
