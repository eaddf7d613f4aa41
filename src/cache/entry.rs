//! Cache keys, entries and the event payloads the cache publishes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::LoadError;
use crate::quality::Quality;

/// Estimated in-memory footprint of a cached instance.
pub trait CacheWeight {
    fn estimated_size(&self) -> usize;
}

impl CacheWeight for Vec<u8> {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl<T: CacheWeight + ?Sized> CacheWeight for std::sync::Arc<T> {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}

/// Composite `(asset id, quality)` key, rendered as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    repr: String,
    quality: Option<Quality>,
}

impl CacheKey {
    pub fn new(asset_id: &str, quality: Quality) -> Self {
        Self {
            repr: format!("{asset_id}@{quality}"),
            quality: Some(quality),
        }
    }

    /// Key with no quality tag, for callers using the cache directly.
    pub fn opaque(repr: impl Into<String>) -> Self {
        Self {
            repr: repr.into(),
            quality: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn quality(&self) -> Option<Quality> {
        self.quality
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// A stored instance plus its bookkeeping.
#[derive(Debug)]
pub struct CacheEntry<I> {
    pub(crate) key: CacheKey,
    pub(crate) instance: I,
    pub(crate) size: usize,
    pub(crate) last_access: Instant,
    pub(crate) access_count: u64,
    pub(crate) metadata: serde_json::Value,
    /// Position in the access order; larger is more recent.
    pub(crate) stamp: u64,
}

impl<I> CacheEntry<I> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub(crate) fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.key.as_str().to_string(),
            quality: self.key.quality(),
            size: self.size,
            access_count: self.access_count,
            idle: self.last_access.elapsed(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Instance-free view of an entry, carried by events and stats.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub quality: Option<Quality>,
    pub size: usize,
    pub access_count: u64,
    pub idle: Duration,
    pub metadata: serde_json::Value,
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Made room for a new entry.
    Lru,
    /// Explicit `delete`.
    Manual,
    /// Explicit `clear`.
    Cleared,
    /// Overwritten by a `put` for the same key.
    Replaced,
    /// Maintenance: idle one-shot entry.
    Expired,
    /// Maintenance: size above the memory threshold.
    Pressure,
    /// Access order lost track of entries while over budget.
    Reset,
}

impl EvictionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionReason::Lru => "lru",
            EvictionReason::Manual => "manual",
            EvictionReason::Cleared => "cleared",
            EvictionReason::Replaced => "replaced",
            EvictionReason::Expired => "expired",
            EvictionReason::Pressure => "pressure",
            EvictionReason::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvictionEvent {
    pub key: String,
    pub entry: EntrySummary,
    pub reason: EvictionReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadEvent {
    pub key: String,
    pub load_time: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadFailedEvent {
    pub key: String,
    pub error: LoadError,
}

/// Per-entry usage line in [`CacheStats`].
#[derive(Debug, Clone, Serialize)]
pub struct EntryUsage {
    pub key: String,
    pub access_count: u64,
    pub size: usize,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub current_size: usize,
    pub max_size: usize,
    pub size_utilization: f64,
    pub entry_count: usize,
    pub max_entries: usize,
    pub entry_utilization: f64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub most_used: Vec<EntryUsage>,
    pub least_used: Vec<EntryUsage>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub pressure_evicted: usize,
}
