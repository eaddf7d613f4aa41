//! Health reporting for a running LOD system.
//!
//! Folds manager, cache and performance snapshots into one serializable
//! report with an overall state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::perf::PerformanceMetrics;
use crate::quality::ManagerStats;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Full system report.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub state: HealthState,
    pub running: bool,
    /// Why the state is not `Healthy`.
    pub reasons: Vec<String>,
    pub uptime_secs: u64,
    pub target_fps: f64,
    pub assets: ManagerStats,
    pub cache: CacheStats,
    pub performance: PerformanceMetrics,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Average fps below target × this is degraded.
    pub degraded_fps_ratio: f64,
    /// Average fps below target × this is unhealthy.
    pub unhealthy_fps_ratio: f64,
    pub degraded_memory_percent: f64,
    pub unhealthy_memory_percent: f64,
    /// Hit rate below this is degraded once enough lookups happened.
    pub min_hit_rate: f64,
    pub min_lookups: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_fps_ratio: 0.8,
            unhealthy_fps_ratio: 0.5,
            degraded_memory_percent: 85.0,
            unhealthy_memory_percent: 95.0,
            min_hit_rate: 0.5,
            min_lookups: 20,
        }
    }
}

/// Aggregates health information from the LOD components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Generate full health report.
    pub fn report(
        &self,
        running: bool,
        target_fps: f64,
        assets: ManagerStats,
        cache: CacheStats,
        performance: PerformanceMetrics,
    ) -> SystemReport {
        let (state, reasons) = self.compute_state(running, target_fps, &cache, &performance);
        SystemReport {
            state,
            running,
            reasons,
            uptime_secs: self.start_time.elapsed().as_secs(),
            target_fps,
            assets,
            cache,
            performance,
        }
    }

    fn compute_state(
        &self,
        running: bool,
        target_fps: f64,
        cache: &CacheStats,
        performance: &PerformanceMetrics,
    ) -> (HealthState, Vec<String>) {
        let config = &self.config;
        let mut state = HealthState::Healthy;
        let mut reasons = Vec::new();
        let mut flag = |level: HealthState, reason: String| {
            state = state.max(level);
            reasons.push(reason);
        };

        if !running {
            flag(HealthState::Unhealthy, "system not running".into());
        }

        if performance.sample_count > 0 {
            let fps = performance.average_fps;
            if fps < target_fps * config.unhealthy_fps_ratio {
                flag(
                    HealthState::Unhealthy,
                    format!("average fps {fps:.1} far below target {target_fps}"),
                );
            } else if fps < target_fps * config.degraded_fps_ratio {
                flag(
                    HealthState::Degraded,
                    format!("average fps {fps:.1} below target {target_fps}"),
                );
            }
        }

        let memory = performance.memory_percentage;
        if memory > config.unhealthy_memory_percent {
            flag(HealthState::Unhealthy, format!("memory at {memory:.1}%"));
        } else if memory > config.degraded_memory_percent {
            flag(HealthState::Degraded, format!("memory at {memory:.1}%"));
        }

        if cache.hits + cache.misses >= config.min_lookups && cache.hit_rate < config.min_hit_rate {
            flag(
                HealthState::Degraded,
                format!("cache hit rate {:.2} below {:.2}", cache.hit_rate, config.min_hit_rate),
            );
        }

        (state, reasons)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
