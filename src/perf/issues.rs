//! Issue classification and recommendation derivation.
//!
//! Both are pure functions of the current metrics; the observer only adds
//! the consecutive-issue bookkeeping around them.

use serde::{Deserialize, Serialize};

use super::observer::PerformanceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    LowFps,
    HighMemory,
    SlowRender,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::LowFps => "low_fps",
            IssueKind::HighMemory => "high_memory",
            IssueKind::SlowRender => "slow_render",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A detected deviation with the measurement that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// Measured value (fps, memory percent, or render milliseconds).
    pub value: f64,
    /// Threshold the value crossed.
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ReduceModelQuality,
    ReduceActiveModels,
    ClearCache,
    UnloadDistantModels,
    OptimizeLodDistances,
    ReduceDrawCalls,
    OptimizeMaterials,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::ReduceModelQuality => "reduce_model_quality",
            Recommendation::ReduceActiveModels => "reduce_active_models",
            Recommendation::ClearCache => "clear_cache",
            Recommendation::UnloadDistantModels => "unload_distant_models",
            Recommendation::OptimizeLodDistances => "optimize_lod_distances",
            Recommendation::ReduceDrawCalls => "reduce_draw_calls",
            Recommendation::OptimizeMaterials => "optimize_materials",
        }
    }
}

/// Alert thresholds. Defaults follow common 60 fps tuning and are not
/// derived from anything deeper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssueThresholds {
    /// Fps below `target × alert_threshold` raises `LowFps`.
    pub alert_threshold: f64,
    pub fps_critical_ratio: f64,
    pub fps_high_ratio: f64,
    pub fps_medium_ratio: f64,
    /// Memory percentage above this raises `HighMemory`.
    pub memory_alert_percent: f64,
    pub memory_medium_percent: f64,
    pub memory_high_percent: f64,
    pub memory_critical_percent: f64,
    /// Frame render time above this raises `SlowRender`.
    pub render_time_ceiling_ms: f64,
}

impl Default for IssueThresholds {
    fn default() -> Self {
        Self {
            alert_threshold: 0.8,
            fps_critical_ratio: 0.5,
            fps_high_ratio: 0.7,
            fps_medium_ratio: 0.8,
            memory_alert_percent: 80.0,
            memory_medium_percent: 85.0,
            memory_high_percent: 90.0,
            memory_critical_percent: 95.0,
            render_time_ceiling_ms: 33.0,
        }
    }
}

impl IssueThresholds {
    /// Severity for an fps reading. Never decreases as fps decreases.
    pub fn fps_severity(&self, fps: f64, target: f64) -> Severity {
        let ratio = if target > 0.0 { fps / target } else { 1.0 };
        if ratio < self.fps_critical_ratio {
            Severity::Critical
        } else if ratio < self.fps_high_ratio {
            Severity::High
        } else if ratio < self.fps_medium_ratio {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn memory_severity(&self, percentage: f64) -> Severity {
        if percentage > self.memory_critical_percent {
            Severity::Critical
        } else if percentage > self.memory_high_percent {
            Severity::High
        } else if percentage > self.memory_medium_percent {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Evaluate the three independent rules against `metrics`.
    ///
    /// The fps rule only applies once at least one frame has been sampled.
    pub fn detect(&self, metrics: &PerformanceMetrics, target_fps: f64) -> Vec<Issue> {
        let mut issues = Vec::new();

        let fps_floor = target_fps * self.alert_threshold;
        if metrics.sample_count > 0 && metrics.average_fps < fps_floor {
            issues.push(Issue {
                kind: IssueKind::LowFps,
                severity: self.fps_severity(metrics.average_fps, target_fps),
                value: metrics.average_fps,
                threshold: fps_floor,
            });
        }

        if metrics.memory_percentage > self.memory_alert_percent {
            issues.push(Issue {
                kind: IssueKind::HighMemory,
                severity: self.memory_severity(metrics.memory_percentage),
                value: metrics.memory_percentage,
                threshold: self.memory_alert_percent,
            });
        }

        if metrics.render_time_ms > self.render_time_ceiling_ms {
            issues.push(Issue {
                kind: IssueKind::SlowRender,
                severity: Severity::Medium,
                value: metrics.render_time_ms,
                threshold: self.render_time_ceiling_ms,
            });
        }

        issues
    }
}

/// Corrective actions for a set of issues, first occurrence order, no
/// duplicates.
pub fn recommendations_for(issues: &[Issue]) -> Vec<Recommendation> {
    let mut out: Vec<Recommendation> = Vec::new();
    let mut add = |r: Recommendation| {
        if !out.contains(&r) {
            out.push(r);
        }
    };

    for issue in issues {
        match issue.kind {
            IssueKind::LowFps => {
                add(Recommendation::ReduceModelQuality);
                if issue.severity >= Severity::High {
                    add(Recommendation::ReduceActiveModels);
                }
                add(Recommendation::OptimizeLodDistances);
            }
            IssueKind::HighMemory => {
                if issue.severity >= Severity::High {
                    add(Recommendation::ClearCache);
                }
                add(Recommendation::UnloadDistantModels);
            }
            IssueKind::SlowRender => {
                add(Recommendation::ReduceDrawCalls);
                add(Recommendation::OptimizeMaterials);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(fps: f64, memory: f64, render_ms: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            average_fps: fps,
            memory_percentage: memory,
            render_time_ms: render_ms,
            sample_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn fps_severity_is_monotonic() {
        let t = IssueThresholds::default();
        let mut last = Severity::Low;
        let mut fps = 60.0;
        while fps >= 0.0 {
            let severity = t.fps_severity(fps, 60.0);
            assert!(severity >= last, "severity dropped at {fps} fps");
            last = severity;
            fps -= 0.5;
        }
        assert_eq!(last, Severity::Critical);
    }

    #[test]
    fn fps_severity_bands() {
        let t = IssueThresholds::default();
        assert_eq!(t.fps_severity(25.0, 60.0), Severity::Critical);
        assert_eq!(t.fps_severity(35.0, 60.0), Severity::High);
        assert_eq!(t.fps_severity(45.0, 60.0), Severity::Medium);
        assert_eq!(t.fps_severity(50.0, 60.0), Severity::Low);
    }

    #[test]
    fn memory_severity_bands() {
        let t = IssueThresholds::default();
        assert_eq!(t.memory_severity(82.0), Severity::Low);
        assert_eq!(t.memory_severity(86.0), Severity::Medium);
        assert_eq!(t.memory_severity(91.0), Severity::High);
        assert_eq!(t.memory_severity(96.0), Severity::Critical);
    }

    #[test]
    fn healthy_metrics_raise_nothing() {
        let t = IssueThresholds::default();
        assert!(t.detect(&metrics(60.0, 40.0, 16.0), 60.0).is_empty());
    }

    #[test]
    fn no_fps_issue_before_first_sample() {
        let t = IssueThresholds::default();
        let m = PerformanceMetrics::default();
        assert!(t.detect(&m, 60.0).is_empty());
    }

    #[test]
    fn all_three_rules_fire_independently() {
        let t = IssueThresholds::default();
        let issues = t.detect(&metrics(20.0, 92.0, 50.0), 60.0);
        let kinds: Vec<_> = issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IssueKind::LowFps, IssueKind::HighMemory, IssueKind::SlowRender]
        );
        assert_eq!(issues[2].severity, Severity::Medium);
    }

    #[test]
    fn recommendations_are_deduplicated() {
        let issue = Issue {
            kind: IssueKind::LowFps,
            severity: Severity::Critical,
            value: 10.0,
            threshold: 48.0,
        };
        let recs = recommendations_for(&[issue, issue]);
        assert_eq!(
            recs,
            vec![
                Recommendation::ReduceModelQuality,
                Recommendation::ReduceActiveModels,
                Recommendation::OptimizeLodDistances,
            ]
        );
    }

    #[test]
    fn mild_memory_pressure_does_not_clear_cache() {
        let issue = Issue {
            kind: IssueKind::HighMemory,
            severity: Severity::Medium,
            value: 86.0,
            threshold: 80.0,
        };
        assert_eq!(
            recommendations_for(&[issue]),
            vec![Recommendation::UnloadDistantModels]
        );
    }
}
