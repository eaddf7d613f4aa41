//! Content cache benchmarks.
//!
//! Measures lookup, insert-with-eviction and distance selection throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::Value;

use lod_core::cache::{CacheKey, ContentCache, ContentCacheConfig};
use lod_core::quality::{DistanceThresholds, Quality};

fn filled_cache(entries: usize) -> (ContentCache<Vec<u8>>, Vec<CacheKey>) {
    let cache = ContentCache::new(ContentCacheConfig {
        max_size: 64 * 1024 * 1024,
        max_entries: entries,
        ..Default::default()
    });
    let keys: Vec<CacheKey> = (0..entries)
        .map(|i| CacheKey::new(&format!("asset-{i}"), Quality::ALL[i % 3]))
        .collect();
    for key in &keys {
        let _ = cache.put(key, vec![0u8; 1024], Value::Null);
    }
    (cache, keys)
}

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");

    for entries in [16, 128, 1024] {
        let (cache, keys) = filled_cache(entries);
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("hit", entries), |b| {
            let mut i = 0;
            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                black_box(cache.get(key))
            })
        });
    }

    let (cache, _) = filled_cache(128);
    let missing = CacheKey::opaque("missing");
    group.bench_function("miss", |b| b.iter(|| black_box(cache.get(&missing))));

    group.finish();
}

fn bench_cache_put_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_put");

    for entries in [16, 128, 1024] {
        let (cache, _) = filled_cache(entries);
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("evicting", entries), |b| {
            let mut id = 0u64;
            b.iter(|| {
                // Cache is full, so every insert evicts the LRU entry.
                let key = CacheKey::opaque(format!("new-{id}"));
                id += 1;
                let _ = cache.put(&key, black_box(vec![0u8; 1024]), Value::Null);
            })
        });
    }

    group.finish();
}

fn bench_distance_select(c: &mut Criterion) {
    let thresholds = DistanceThresholds::default();
    let distances: Vec<f32> = (0..256).map(|i| i as f32 * 0.5).collect();

    c.bench_function("distance_select_256", |b| {
        b.iter(|| {
            for d in &distances {
                black_box(thresholds.select(black_box(*d)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_cache_get,
    bench_cache_put_evicting,
    bench_distance_select
);
criterion_main!(benches);
