//! Content cache for loaded asset instances.
//!
//! Keyed by `(asset id, quality)`, bounded by both bytes and entry count,
//! evicting least recently used entries first.

mod content;
mod entry;

pub use content::{ContentCache, ContentCacheConfig};
pub use entry::{
    CacheEntry, CacheKey, CacheStats, CacheWeight, EntrySummary, EntryUsage, EvictionEvent,
    EvictionReason, LoadEvent, LoadFailedEvent, MaintenanceReport,
};
