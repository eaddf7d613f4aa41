//! Bounded content cache with LRU eviction and in-flight load sharing.
//!
//! All mutation goes through the cache's own operations. Event subscribers
//! are always invoked after internal locks are released, so a handler may
//! call back into the cache.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::entry::{
    CacheEntry, CacheKey, CacheStats, CacheWeight, EntryUsage, EvictionEvent, EvictionReason,
    LoadEvent, LoadFailedEvent, MaintenanceReport,
};
use crate::error::{CacheError, LoadError};
use crate::events::EventHub;
use crate::telemetry;

/// Configuration for [`ContentCache`].
#[derive(Debug, Clone)]
pub struct ContentCacheConfig {
    /// Byte budget for all live entries.
    pub max_size: usize,
    /// Entry-count budget.
    pub max_entries: usize,
    /// Fraction of `max_size` above which maintenance evicts preemptively.
    pub memory_threshold: f64,
    pub maintenance_interval: Duration,
    /// One-shot entries idle for longer than this are dropped by maintenance.
    pub max_idle_age: Duration,
    /// Length of the most/least used lists in [`CacheStats`].
    pub stats_top_n: usize,
}

impl Default for ContentCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 256 * 1024 * 1024, // 256 MiB
            max_entries: 100,
            memory_threshold: 0.8,
            maintenance_interval: Duration::from_secs(60),
            max_idle_age: Duration::from_secs(300),
            stats_top_n: 5,
        }
    }
}

type LoadOutcome<I> = (Result<I, LoadError>, Duration);
type SharedLoad<I> = Shared<BoxFuture<'static, LoadOutcome<I>>>;
type Evicted<I> = Vec<(CacheEntry<I>, EvictionReason)>;

struct CacheState<I> {
    entries: HashMap<String, CacheEntry<I>>,
    /// Access order: stamp → key. The first entry is least recently used.
    order: BTreeMap<u64, String>,
    next_stamp: u64,
    current_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<I> CacheState<I> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
            current_size: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn next_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn touch(&mut self, key: &str) -> Option<&CacheEntry<I>> {
        let stamp = self.next_stamp();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.stamp);
        entry.stamp = stamp;
        entry.last_access = Instant::now();
        entry.access_count += 1;
        self.order.insert(stamp, key.to_string());
        Some(entry)
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<I>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        self.current_size -= entry.size;
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry<I>> {
        loop {
            let (_, key) = self.order.pop_first()?;
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size -= entry.size;
                return Some(entry);
            }
        }
    }

    fn drain_all(&mut self) -> Vec<CacheEntry<I>> {
        let entries = mem::take(&mut self.entries);
        self.order.clear();
        self.current_size = 0;
        let mut drained: Vec<_> = entries.into_values().collect();
        drained.sort_by_key(|e| e.stamp);
        drained
    }
}

struct CacheInner<I> {
    config: ContentCacheConfig,
    state: Mutex<CacheState<I>>,
    in_flight: Mutex<HashMap<String, SharedLoad<I>>>,
    evictions: EventHub<EvictionEvent>,
    loads: EventHub<LoadEvent>,
    errors: EventHub<LoadFailedEvent>,
}

/// Shared handle to a size- and count-bounded LRU cache.
///
/// Lock order is `in_flight` before `state`.
pub struct ContentCache<I> {
    inner: Arc<CacheInner<I>>,
}

impl<I> Clone for ContentCache<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> ContentCache<I>
where
    I: CacheWeight + Clone + Send + Sync + 'static,
{
    pub fn new(mut config: ContentCacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState::new()),
                in_flight: Mutex::new(HashMap::new()),
                evictions: EventHub::new("eviction"),
                loads: EventHub::new("load"),
                errors: EventHub::new("error"),
            }),
        }
    }

    pub fn config(&self) -> &ContentCacheConfig {
        &self.inner.config
    }

    pub fn evictions(&self) -> &EventHub<EvictionEvent> {
        &self.inner.evictions
    }

    pub fn loads(&self) -> &EventHub<LoadEvent> {
        &self.inner.loads
    }

    pub fn errors(&self) -> &EventHub<LoadFailedEvent> {
        &self.inner.errors
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<I> {
        let found = {
            let mut state = self.inner.state.lock();
            let found = state.touch(key.as_str()).map(|e| e.instance.clone());
            match found {
                Some(_) => state.hits += 1,
                None => state.misses += 1,
            }
            found
        };
        telemetry::record_cache_lookup(found.is_some());
        found
    }

    /// Return the cached instance for `key`, or run `loader` and cache its
    /// result. Concurrent callers for a key whose load is still pending
    /// await that load instead of starting another.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
        metadata: serde_json::Value,
    ) -> Result<I, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<I, LoadError>> + Send + 'static,
    {
        let load = {
            let mut in_flight = self.inner.in_flight.lock();
            if let Some(hit) = self.get(key) {
                return Ok(hit);
            }
            match in_flight.get(key.as_str()) {
                Some(pending) => {
                    tracing::debug!(key = %key, "joining in-flight load");
                    pending.clone()
                }
                None => {
                    let fut = loader();
                    let shared = async move {
                        let started = Instant::now();
                        let result = fut.await;
                        (result, started.elapsed())
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.as_str().to_string(), shared.clone());
                    shared
                }
            }
        };

        let (result, load_time) = load.clone().await;
        self.finish_load(key, &load, &result, load_time, metadata);
        result
    }

    /// Settle a completed load exactly once: whichever waiter observes it
    /// first stores the result and publishes the load or error event.
    fn finish_load(
        &self,
        key: &CacheKey,
        load: &SharedLoad<I>,
        result: &Result<I, LoadError>,
        load_time: Duration,
        metadata: serde_json::Value,
    ) {
        let (owner, stored) = {
            let mut in_flight = self.inner.in_flight.lock();
            let owner = in_flight
                .get(key.as_str())
                .is_some_and(|pending| pending.ptr_eq(load));
            let mut stored = None;
            if owner {
                in_flight.remove(key.as_str());
                if let Ok(instance) = result {
                    stored = Some(self.insert(key, instance.clone(), metadata));
                }
            }
            (owner, stored)
        };

        if let Some(Ok(evicted)) = stored {
            self.publish_evictions(evicted);
        }
        if !owner {
            return;
        }

        match result {
            Ok(_) => {
                telemetry::record_load_time(load_time);
                self.inner.loads.publish(&LoadEvent {
                    key: key.as_str().to_string(),
                    load_time,
                });
            }
            Err(error) => {
                tracing::warn!(key = %key, %error, "load failed");
                self.inner.errors.publish(&LoadFailedEvent {
                    key: key.as_str().to_string(),
                    error: error.clone(),
                });
            }
        }
    }

    /// Store `instance` under `key`, evicting least recently used entries
    /// as needed. Instances larger than half the byte budget are rejected.
    pub fn put(
        &self,
        key: &CacheKey,
        instance: I,
        metadata: serde_json::Value,
    ) -> Result<(), CacheError> {
        let evicted = self.insert(key, instance, metadata)?;
        self.publish_evictions(evicted);
        Ok(())
    }

    fn insert(
        &self,
        key: &CacheKey,
        instance: I,
        metadata: serde_json::Value,
    ) -> Result<Evicted<I>, CacheError> {
        let size = instance.estimated_size();
        let limit = self.inner.config.max_size / 2;
        if size > limit {
            tracing::warn!(key = %key, size, limit, "entry too large to cache, skipping");
            return Err(CacheError::Overflow {
                key: key.as_str().to_string(),
                size,
                limit,
            });
        }

        let mut state = self.inner.state.lock();
        let mut evicted = Vec::new();
        if let Some(previous) = state.remove(key.as_str()) {
            evicted.push((previous, EvictionReason::Replaced));
        }
        self.evict_for(&mut state, size, &mut evicted);

        let stamp = state.next_stamp();
        state.order.insert(stamp, key.as_str().to_string());
        state.current_size += size;
        state.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                key: key.clone(),
                instance,
                size,
                last_access: Instant::now(),
                access_count: 1,
                metadata,
                stamp,
            },
        );
        state.evictions += evicted.len() as u64;
        telemetry::record_cache_usage(state.current_size, state.entries.len());

        Ok(evicted)
    }

    /// Evict least recently used entries until `required` more bytes and
    /// one more entry fit within budget.
    pub fn ensure_space(&self, required: usize) {
        let evicted = {
            let mut state = self.inner.state.lock();
            let mut evicted = Vec::new();
            self.evict_for(&mut state, required, &mut evicted);
            state.evictions += evicted.len() as u64;
            evicted
        };
        self.publish_evictions(evicted);
    }

    fn evict_for(&self, state: &mut CacheState<I>, required: usize, evicted: &mut Evicted<I>) {
        let config = &self.inner.config;
        while state.current_size + required > config.max_size
            || state.entries.len() >= config.max_entries
        {
            match state.pop_lru() {
                Some(entry) => evicted.push((entry, EvictionReason::Lru)),
                None => {
                    tracing::warn!(
                        size = state.current_size,
                        entries = state.entries.len(),
                        "access order exhausted while over budget, resetting cache"
                    );
                    evicted.extend(
                        state
                            .drain_all()
                            .into_iter()
                            .map(|e| (e, EvictionReason::Reset)),
                    );
                    break;
                }
            }
        }
    }

    /// Remove `key`. Returns false if it was not cached.
    pub fn delete(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.remove(key.as_str());
            if removed.is_some() {
                state.evictions += 1;
            }
            removed
        };
        match removed {
            Some(entry) => {
                self.publish_evictions(vec![(entry, EvictionReason::Manual)]);
                true
            }
            None => false,
        }
    }

    /// Remove every entry. Hit and miss counters are kept.
    pub fn clear(&self) -> usize {
        let drained = {
            let mut state = self.inner.state.lock();
            let drained = state.drain_all();
            state.evictions += drained.len() as u64;
            drained
        };
        let count = drained.len();
        self.publish_evictions(
            drained
                .into_iter()
                .map(|e| (e, EvictionReason::Cleared))
                .collect(),
        );
        tracing::debug!(count, "cache cleared");
        count
    }

    /// Drop idle one-shot entries, then evict one more LRU entry if the
    /// cache is above its memory threshold.
    pub fn perform_maintenance(&self) -> MaintenanceReport {
        let config = &self.inner.config;
        let now = Instant::now();
        let (report, evicted) = {
            let mut state = self.inner.state.lock();
            let mut stale: Vec<(u64, String)> = state
                .entries
                .iter()
                .filter(|(_, e)| {
                    e.access_count <= 1 && now.duration_since(e.last_access) > config.max_idle_age
                })
                .map(|(k, e)| (e.stamp, k.clone()))
                .collect();
            stale.sort();

            let mut evicted = Vec::new();
            for (_, key) in stale {
                if let Some(entry) = state.remove(&key) {
                    evicted.push((entry, EvictionReason::Expired));
                }
            }
            let expired = evicted.len();

            let threshold = config.max_size as f64 * config.memory_threshold;
            let mut pressure_evicted = 0;
            if state.current_size as f64 > threshold {
                if let Some(entry) = state.pop_lru() {
                    evicted.push((entry, EvictionReason::Pressure));
                    pressure_evicted = 1;
                }
            }
            state.evictions += evicted.len() as u64;
            telemetry::record_cache_usage(state.current_size, state.entries.len());
            (
                MaintenanceReport {
                    expired,
                    pressure_evicted,
                },
                evicted,
            )
        };

        self.publish_evictions(evicted);
        if report != MaintenanceReport::default() {
            tracing::debug!(?report, "cache maintenance evicted entries");
        }
        report
    }

    /// Run [`perform_maintenance`](Self::perform_maintenance) every
    /// `maintenance_interval` until `token` is cancelled.
    pub fn spawn_maintenance(&self, token: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        let period = self
            .inner
            .config
            .maintenance_interval
            .max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.perform_maintenance();
                    }
                }
            }
            tracing::debug!("cache maintenance stopped");
        })
    }

    pub fn stats(&self) -> CacheStats {
        let config = &self.inner.config;
        let state = self.inner.state.lock();

        let mut usage: Vec<EntryUsage> = state
            .entries
            .values()
            .map(|e| EntryUsage {
                key: e.key.as_str().to_string(),
                access_count: e.access_count,
                size: e.size,
            })
            .collect();
        usage.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then_with(|| a.key.cmp(&b.key))
        });

        let n = config.stats_top_n;
        let lookups = state.hits + state.misses;
        CacheStats {
            current_size: state.current_size,
            max_size: config.max_size,
            size_utilization: ratio(state.current_size as f64, config.max_size as f64),
            entry_count: state.entries.len(),
            max_entries: config.max_entries,
            entry_utilization: ratio(state.entries.len() as f64, config.max_entries as f64),
            hits: state.hits,
            misses: state.misses,
            hit_rate: ratio(state.hits as f64, lookups as f64),
            evictions: state.evictions,
            most_used: usage.iter().take(n).cloned().collect(),
            least_used: usage.iter().rev().take(n).cloned().collect(),
        }
    }

    /// Up to `n` keys, least recently used first.
    pub fn least_recently_used(&self, n: usize) -> Vec<CacheKey> {
        let state = self.inner.state.lock();
        state
            .order
            .values()
            .filter_map(|k| state.entries.get(k).map(|e| e.key.clone()))
            .take(n)
            .collect()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().entries.contains_key(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    pub fn current_size(&self) -> usize {
        self.inner.state.lock().current_size
    }

    fn publish_evictions(&self, evicted: Evicted<I>) {
        for (entry, reason) in evicted {
            telemetry::record_cache_eviction(reason.as_str());
            self.inner.evictions.publish(&EvictionEvent {
                key: entry.key.as_str().to_string(),
                entry: entry.summary(),
                reason,
            });
        }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize, max_entries: usize) -> ContentCache<Vec<u8>> {
        ContentCache::new(ContentCacheConfig {
            max_size,
            max_entries,
            ..Default::default()
        })
    }

    #[test]
    fn replacing_a_key_keeps_size_consistent() {
        let cache = cache(1000, 10);
        let key = CacheKey::opaque("a");
        cache.put(&key, vec![0; 100], serde_json::Value::Null).unwrap();
        cache.put(&key, vec![0; 40], serde_json::Value::Null).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 40);
    }

    #[test]
    fn ensure_space_frees_room_ahead_of_insert() {
        let cache = cache(300, 10);
        for name in ["a", "b", "c"] {
            cache
                .put(&CacheKey::opaque(name), vec![0; 100], serde_json::Value::Null)
                .unwrap();
        }

        cache.ensure_space(150);

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&CacheKey::opaque("c")));
    }

    #[test]
    fn cached_value_skips_loader() {
        let cache = cache(1000, 10);
        let key = CacheKey::opaque("a");
        cache.put(&key, vec![1; 4], serde_json::Value::Null).unwrap();

        let value = tokio_test::block_on(cache.get_or_load(
            &key,
            || async { Err(LoadError::Rejected("loader must not run".into())) },
            serde_json::Value::Null,
        ))
        .unwrap();

        assert_eq!(value, vec![1; 4]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn zero_entry_budget_is_clamped() {
        let cache = cache(1000, 0);
        assert_eq!(cache.config().max_entries, 1);
    }
}
