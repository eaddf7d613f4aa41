//! Metric recorders for the LOD core.
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! host installs a recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::quality::Quality;

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("lod_cache_hits_total").increment(1);
    } else {
        counter!("lod_cache_misses_total").increment(1);
    }
}

pub fn record_load_time(elapsed: Duration) {
    histogram!("lod_load_time_ms").record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_cache_usage(size_bytes: usize, entries: usize) {
    gauge!("lod_cache_size_bytes").set(size_bytes as f64);
    gauge!("lod_cache_entries").set(entries as f64);
}

pub fn record_cache_eviction(reason: &'static str) {
    counter!("lod_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_quality_change(from: Option<Quality>, to: Quality) {
    let from = from.map(Quality::as_str).unwrap_or("none");
    counter!("lod_quality_changes_total", "from" => from, "to" => to.as_str()).increment(1);
}

pub fn record_fallback() {
    counter!("lod_transition_fallbacks_total").increment(1);
}

pub fn record_exhausted() {
    counter!("lod_transitions_exhausted_total").increment(1);
}

pub fn record_frame(average_fps: f64, render_ms: f64) {
    gauge!("lod_fps_average").set(average_fps);
    histogram!("lod_render_time_ms").record(render_ms);
}

pub fn record_memory(percentage: f64) {
    gauge!("lod_memory_percent").set(percentage);
}

pub fn record_issue(kind: &'static str, severity: &'static str) {
    counter!("lod_perf_issues_total", "kind" => kind, "severity" => severity).increment(1);
}

pub fn record_optimization() {
    counter!("lod_optimizations_total").increment(1);
}
