//! Integration tests for ContentCache - LRU eviction, size accounting,
//! shared in-flight loads and maintenance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lod_core::cache::{CacheKey, ContentCache, ContentCacheConfig, EvictionReason};
use lod_core::error::{CacheError, LoadError};
use lod_core::quality::Quality;
use proptest::prelude::*;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

fn cache_with(max_size: usize, max_entries: usize) -> ContentCache<Vec<u8>> {
    ContentCache::new(ContentCacheConfig {
        max_size,
        max_entries,
        ..Default::default()
    })
}

fn key(name: &str) -> CacheKey {
    CacheKey::opaque(name)
}

#[test]
fn test_key_combines_asset_and_quality() {
    let key = CacheKey::new("tree", Quality::High);
    assert_eq!(key.as_str(), "tree@high");
    assert_eq!(key.quality(), Some(Quality::High));
    assert_ne!(key, CacheKey::new("tree", Quality::Low));
}

#[test]
fn test_lru_evicts_least_recently_used() {
    let cache = cache_with(10_000, 3);
    for name in ["a", "b", "c"] {
        cache.put(&key(name), vec![0; 10], Value::Null).unwrap();
    }
    assert!(cache.get(&key("a")).is_some());

    cache.put(&key("d"), vec![0; 10], Value::Null).unwrap();

    assert!(!cache.contains(&key("b")), "b was least recently used");
    assert!(cache.contains(&key("a")));
    assert!(cache.contains(&key("c")));
    assert!(cache.contains(&key("d")));

    cache.put(&key("e"), vec![0; 10], Value::Null).unwrap();
    assert!(!cache.contains(&key("c")), "c goes before a");
}

#[test]
fn test_size_budget_evicts_until_fit() {
    let cache = cache_with(1000, 10);
    for name in ["a", "b", "c"] {
        cache.put(&key(name), vec![0; 300], Value::Null).unwrap();
    }
    cache.put(&key("d"), vec![0; 400], Value::Null).unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.current_size(), 1000);
    assert!(!cache.contains(&key("a")));
}

#[test]
fn test_oversized_entry_rejected() {
    let cache = cache_with(100, 10);
    let result = cache.put(&key("big"), vec![0; 60], Value::Null);

    assert_eq!(
        result,
        Err(CacheError::Overflow {
            key: "big".to_string(),
            size: 60,
            limit: 50,
        })
    );
    assert!(!cache.contains(&key("big")));
    assert_eq!(cache.current_size(), 0);
}

#[tokio::test]
async fn test_oversized_load_still_returned() {
    let cache = cache_with(100, 10);
    let loaded = cache
        .get_or_load(&key("big"), || async { Ok(vec![1; 80]) }, Value::Null)
        .await
        .unwrap();

    assert_eq!(loaded.len(), 80);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_get_or_load_shares_one_load() {
    let cache = cache_with(10_000, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    let loader = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, LoadError>(vec![7; 32])
        }
    };

    let k = key("shared");
    let (first, second) = tokio::join!(
        cache.get_or_load(&k, loader(calls.clone()), Value::Null),
        cache.get_or_load(&k, loader(calls.clone()), Value::Null),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.unwrap(), vec![7; 32]);
    assert_eq!(second.unwrap(), vec![7; 32]);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_failed_load_not_cached_and_reported() {
    let cache = cache_with(10_000, 10);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    cache.errors().subscribe(move |event| {
        sink.lock().unwrap().push(event.key.clone());
        Ok(())
    });

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let calls = calls.clone();
        let result = cache
            .get_or_load(
                &key("broken"),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Vec<u8>, _>(LoadError::failed("broken.glb", "truncated"))
                },
                Value::Null,
            )
            .await;
        assert!(matches!(result, Err(LoadError::Failed { .. })));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2, "failures are not cached");
    assert!(!cache.contains(&key("broken")));
    assert_eq!(*errors.lock().unwrap(), vec!["broken", "broken"]);
}

#[tokio::test]
async fn test_load_event_published_once_per_load() {
    let cache = cache_with(10_000, 10);
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    cache.loads().subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for _ in 0..3 {
        cache
            .get_or_load(&key("a"), || async { Ok(vec![0; 4]) }, Value::Null)
            .await
            .unwrap();
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_eviction_events_carry_reason() {
    let cache = cache_with(10_000, 2);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    cache.evictions().subscribe(move |event| {
        sink.lock().unwrap().push((event.key.clone(), event.reason));
        Ok(())
    });

    cache.put(&key("a"), vec![0; 1], Value::Null).unwrap();
    cache.put(&key("a"), vec![0; 2], Value::Null).unwrap();
    cache.put(&key("b"), vec![0; 1], Value::Null).unwrap();
    cache.put(&key("c"), vec![0; 1], Value::Null).unwrap();
    assert!(cache.delete(&key("b")));
    assert!(!cache.delete(&key("b")));
    assert_eq!(cache.clear(), 1);

    assert_eq!(
        *reasons.lock().unwrap(),
        vec![
            ("a".to_string(), EvictionReason::Replaced),
            ("a".to_string(), EvictionReason::Lru),
            ("b".to_string(), EvictionReason::Manual),
            ("c".to_string(), EvictionReason::Cleared),
        ]
    );
}

#[test]
fn test_eviction_handler_may_reenter_cache() {
    let cache = cache_with(10_000, 1);
    let observed = Arc::new(AtomicUsize::new(0));
    let (inner, count) = (cache.clone(), observed.clone());
    cache.evictions().subscribe(move |_| {
        count.store(inner.len(), Ordering::SeqCst);
        Ok(())
    });

    cache.put(&key("a"), vec![0; 1], Value::Null).unwrap();
    cache.put(&key("b"), vec![0; 1], Value::Null).unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stats_report_usage() {
    let cache = cache_with(1000, 4);
    cache.put(&key("a"), vec![0; 100], Value::Null).unwrap();
    cache.put(&key("b"), vec![0; 300], Value::Null).unwrap();
    cache.get(&key("a"));
    cache.get(&key("a"));
    cache.get(&key("missing"));

    let stats = cache.stats();
    assert_eq!(stats.current_size, 400);
    assert!((stats.size_utilization - 0.4).abs() < 1e-9);
    assert_eq!(stats.entry_count, 2);
    assert!((stats.entry_utilization - 0.5).abs() < 1e-9);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.most_used[0].key, "a");
    assert_eq!(stats.most_used[0].access_count, 3);
    assert_eq!(stats.least_used[0].key, "b");
}

#[test]
fn test_least_recently_used_order() {
    let cache = cache_with(1000, 10);
    for name in ["a", "b", "c", "d"] {
        cache.put(&key(name), vec![0; 1], Value::Null).unwrap();
    }
    cache.get(&key("a"));

    let keys: Vec<String> = cache
        .least_recently_used(2)
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();
    assert_eq!(keys, vec!["b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_expires_idle_single_use_entries() {
    let cache = ContentCache::new(ContentCacheConfig {
        max_size: 1000,
        max_entries: 10,
        max_idle_age: Duration::from_secs(10),
        ..Default::default()
    });
    cache.put(&key("once"), vec![0u8; 10], Value::Null).unwrap();
    cache.put(&key("reused"), vec![0u8; 10], Value::Null).unwrap();
    cache.get(&key("reused"));

    tokio::time::advance(Duration::from_secs(11)).await;
    let report = cache.perform_maintenance();

    assert_eq!(report.expired, 1);
    assert_eq!(report.pressure_evicted, 0);
    assert!(!cache.contains(&key("once")));
    assert!(cache.contains(&key("reused")));
}

#[test]
fn test_maintenance_evicts_under_pressure() {
    let cache = ContentCache::new(ContentCacheConfig {
        max_size: 1000,
        max_entries: 10,
        memory_threshold: 0.5,
        ..Default::default()
    });
    cache.put(&key("a"), vec![0u8; 300], Value::Null).unwrap();
    cache.put(&key("b"), vec![0u8; 300], Value::Null).unwrap();

    let report = cache.perform_maintenance();

    assert_eq!(report.pressure_evicted, 1);
    assert!(!cache.contains(&key("a")));
    assert_eq!(cache.current_size(), 300);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_maintenance_runs_until_cancelled() {
    let cache = ContentCache::new(ContentCacheConfig {
        max_size: 1000,
        max_entries: 10,
        maintenance_interval: Duration::from_secs(1),
        max_idle_age: Duration::from_millis(500),
        ..Default::default()
    });
    let token = CancellationToken::new();
    let handle = cache.spawn_maintenance(token.clone());

    cache.put(&key("a"), vec![0u8; 10], Value::Null).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!cache.contains(&key("a")));

    token.cancel();
    handle.await.unwrap();
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, usize),
    Get(u8),
    Delete(u8),
    Maintain,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..8, 1usize..600).prop_map(|(k, size)| Op::Put(k, size)),
        2 => (0u8..8).prop_map(Op::Get),
        1 => (0u8..8).prop_map(Op::Delete),
        1 => Just(Op::Maintain),
    ]
}

proptest! {
    #[test]
    fn prop_size_and_count_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let cache: ContentCache<Vec<u8>> = ContentCache::new(ContentCacheConfig {
            max_size: 1000,
            max_entries: 5,
            stats_top_n: 100,
            ..Default::default()
        });

        for op in ops {
            match op {
                Op::Put(k, size) => {
                    let _ = cache.put(&key(&k.to_string()), vec![0; size], Value::Null);
                }
                Op::Get(k) => {
                    cache.get(&key(&k.to_string()));
                }
                Op::Delete(k) => {
                    cache.delete(&key(&k.to_string()));
                }
                Op::Maintain => {
                    cache.perform_maintenance();
                }
            }

            let stats = cache.stats();
            let live: usize = stats.most_used.iter().map(|e| e.size).sum();
            prop_assert_eq!(stats.current_size, live);
            prop_assert_eq!(stats.most_used.len(), stats.entry_count);
            prop_assert!(stats.entry_count <= 5);
            prop_assert!(stats.current_size <= 1000);
        }
    }
}
