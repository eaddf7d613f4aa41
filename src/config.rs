//! Configuration for the LOD core.
//!
//! Built from defaults, optionally seeded from device capabilities, then
//! overridden by `LOD_*` environment variables. Invalid values fall back to
//! the previous value without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `LOD_TARGET_FPS` | 60 | Target frame rate |
//! | `LOD_NEAR` | 10 | High quality distance |
//! | `LOD_MEDIUM` | 50 | Medium quality distance |
//! | `LOD_FAR` | 100 | Distance beyond which assets may be unloaded |
//! | `LOD_CACHE_MAX_BYTES` | 268435456 | Cache byte budget |
//! | `LOD_CACHE_MAX_ENTRIES` | 100 | Cache entry budget |
//! | `LOD_CACHE_MEMORY_THRESHOLD` | 0.8 | Maintenance eviction threshold (fraction) |
//! | `LOD_SAMPLE_WINDOW` | 60 | Frames in the fps rolling window |
//! | `LOD_MEMORY_INTERVAL_MS` | 2000 | Memory sampling interval |
//! | `LOD_DEBOUNCE_MS` | 1000 | Optimization debounce window, at most one hour |
//! | `LOD_MAINTENANCE_INTERVAL_SECS` | 60 | Cache maintenance interval |

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::ContentCacheConfig;
use crate::device::DeviceCapabilities;
use crate::perf::ObserverConfig;
use crate::quality::{DistanceThresholds, QualityManagerConfig, MAX_OPTIMIZATION_DEBOUNCE};

/// Aggregate configuration for all three components.
#[derive(Debug, Clone, Default)]
pub struct LodConfig {
    pub cache: ContentCacheConfig,
    pub observer: ObserverConfig,
    pub manager: QualityManagerConfig,
}

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigViolation {
    pub field: &'static str,
    pub message: String,
}

impl ConfigViolation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {}", join(.0))]
    Invalid(Vec<ConfigViolation>),
}

fn join(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Serializable summary of effective values.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub target_fps: f64,
    pub lod_distances: [f32; 3],
    pub cache_max_bytes: usize,
    pub cache_max_entries: usize,
    pub cache_memory_threshold: f64,
    pub cache_maintenance_interval_secs: u64,
    pub sample_window: usize,
    pub memory_interval_ms: u64,
    pub optimization_debounce_ms: u64,
    pub sustained_issue_frames: u32,
    pub idle_unload_after_secs: Option<u64>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a finite `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_f32(key: &str, default: f32) -> f32 {
    parse_f64(key, default as f64) as f32
}

impl LodConfig {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Seed budgets from a device capability report.
    pub fn from_device(device: &DeviceCapabilities) -> Self {
        let mut config = Self::default();
        let settings = &device.recommended;
        let [near, medium, far] = settings.lod_distances;
        match DistanceThresholds::new(near, medium, far) {
            Ok(thresholds) => config.manager.default_thresholds = thresholds,
            Err(error) => tracing::warn!(%error, "device LOD distances ignored"),
        }
        config.set_target_fps(settings.target_fps);
        config.cache.max_entries = settings.max_models.max(1);
        config.cache.max_size = settings.cache_size_bytes.max(1);
        config
    }

    pub fn with_env_overrides(mut self) -> Self {
        let target_fps = parse_f64("LOD_TARGET_FPS", self.manager.target_fps);
        if target_fps > 0.0 {
            self.set_target_fps(target_fps);
        }

        let current = self.manager.default_thresholds;
        let near = parse_f32("LOD_NEAR", current.near());
        let medium = parse_f32("LOD_MEDIUM", current.medium());
        let far = parse_f32("LOD_FAR", current.far());
        if let Ok(thresholds) = DistanceThresholds::new(near, medium, far) {
            self.manager.default_thresholds = thresholds;
        }

        let cache = &mut self.cache;
        cache.max_size = parse_usize("LOD_CACHE_MAX_BYTES", cache.max_size).max(1);
        cache.max_entries = parse_usize("LOD_CACHE_MAX_ENTRIES", cache.max_entries).max(1);
        let threshold = parse_f64("LOD_CACHE_MEMORY_THRESHOLD", cache.memory_threshold);
        if threshold > 0.0 && threshold <= 1.0 {
            cache.memory_threshold = threshold;
        }
        let maintenance = parse_u64(
            "LOD_MAINTENANCE_INTERVAL_SECS",
            cache.maintenance_interval.as_secs(),
        );
        cache.maintenance_interval = Duration::from_secs(maintenance.max(1));

        let observer = &mut self.observer;
        observer.sample_window = parse_usize("LOD_SAMPLE_WINDOW", observer.sample_window).max(1);
        let interval_ms = parse_u64(
            "LOD_MEMORY_INTERVAL_MS",
            observer.memory_interval.as_millis() as u64,
        );
        observer.memory_interval = Duration::from_millis(interval_ms.max(1));

        let debounce_ms = parse_u64(
            "LOD_DEBOUNCE_MS",
            self.manager.optimization_debounce.as_millis() as u64,
        );
        self.manager.optimization_debounce =
            Duration::from_millis(debounce_ms).min(MAX_OPTIMIZATION_DEBOUNCE);

        self
    }

    fn set_target_fps(&mut self, fps: f64) {
        self.observer.target_fps = fps;
        self.manager.target_fps = fps;
    }

    /// Check every field; all violations are reported together.
    pub fn validate(&self) -> Result<(), Vec<ConfigViolation>> {
        let mut violations = Vec::new();
        let mut check = |ok: bool, field: &'static str, message: &str| {
            if !ok {
                violations.push(ConfigViolation::new(field, message));
            }
        };
        let unit = |v: f64| v > 0.0 && v <= 1.0;

        let cache = &self.cache;
        check(cache.max_size > 0, "cache.max_size", "must be greater than zero");
        check(cache.max_entries > 0, "cache.max_entries", "must be greater than zero");
        check(
            unit(cache.memory_threshold),
            "cache.memory_threshold",
            "must be within (0, 1]",
        );
        check(
            !cache.maintenance_interval.is_zero(),
            "cache.maintenance_interval",
            "must be non-zero",
        );

        let observer = &self.observer;
        check(
            observer.target_fps.is_finite() && observer.target_fps > 0.0,
            "observer.target_fps",
            "must be a positive number",
        );
        check(observer.sample_window > 0, "observer.sample_window", "must be greater than zero");
        check(observer.memory_window > 0, "observer.memory_window", "must be greater than zero");
        check(
            !observer.memory_interval.is_zero(),
            "observer.memory_interval",
            "must be non-zero",
        );
        check(
            observer.memory_budget_bytes > 0,
            "observer.memory_budget_bytes",
            "must be greater than zero",
        );

        let t = &observer.thresholds;
        check(
            unit(t.alert_threshold),
            "observer.thresholds.alert_threshold",
            "must be within (0, 1]",
        );
        check(
            t.fps_critical_ratio <= t.fps_high_ratio && t.fps_high_ratio <= t.fps_medium_ratio,
            "observer.thresholds.fps_ratios",
            "must satisfy critical <= high <= medium",
        );
        check(
            t.memory_alert_percent <= t.memory_medium_percent
                && t.memory_medium_percent <= t.memory_high_percent
                && t.memory_high_percent <= t.memory_critical_percent,
            "observer.thresholds.memory_percents",
            "must satisfy alert <= medium <= high <= critical",
        );
        check(
            t.render_time_ceiling_ms > 0.0,
            "observer.thresholds.render_time_ceiling_ms",
            "must be greater than zero",
        );

        let manager = &self.manager;
        check(
            manager.target_fps.is_finite() && manager.target_fps > 0.0,
            "manager.target_fps",
            "must be a positive number",
        );
        check(
            unit(manager.fps_downgrade_ratio),
            "manager.fps_downgrade_ratio",
            "must be within (0, 1]",
        );
        check(
            manager.memory_cleanup_percent > 0.0 && manager.memory_cleanup_percent <= 100.0,
            "manager.memory_cleanup_percent",
            "must be within (0, 100]",
        );
        check(
            unit(manager.memory_cleanup_fraction),
            "manager.memory_cleanup_fraction",
            "must be within (0, 1]",
        );
        check(
            unit(manager.reduce_active_fraction),
            "manager.reduce_active_fraction",
            "must be within (0, 1]",
        );
        check(
            manager.optimization_debounce <= MAX_OPTIMIZATION_DEBOUNCE,
            "manager.optimization_debounce",
            "must be at most one hour",
        );
        check(
            manager.sustained_issue_frames > 0,
            "manager.sustained_issue_frames",
            "must be greater than zero",
        );

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective(&self) -> EffectiveConfig {
        let t = self.manager.default_thresholds;
        EffectiveConfig {
            target_fps: self.manager.target_fps,
            lod_distances: [t.near(), t.medium(), t.far()],
            cache_max_bytes: self.cache.max_size,
            cache_max_entries: self.cache.max_entries,
            cache_memory_threshold: self.cache.memory_threshold,
            cache_maintenance_interval_secs: self.cache.maintenance_interval.as_secs(),
            sample_window: self.observer.sample_window,
            memory_interval_ms: self.observer.memory_interval.as_millis() as u64,
            optimization_debounce_ms: self.manager.optimization_debounce.as_millis() as u64,
            sustained_issue_frames: self.manager.sustained_issue_frames,
            idle_unload_after_secs: self.manager.idle_unload_after.map(|d| d.as_secs()),
        }
    }
}
