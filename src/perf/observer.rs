//! Frame timing and memory pressure observer.
//!
//! Frames are pushed in by the host render loop via [`PerformanceObserver::record_frame`];
//! memory is sampled on a fixed interval by a background task while the
//! observer is active.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::issues::{recommendations_for, Issue, IssueThresholds, Recommendation};
use super::memory::{MemoryProbe, MemorySnapshot, NoMemoryProbe};
use super::rolling::RollingWindow;
use crate::events::{EventHub, HandlerResult, SubscriptionId};
use crate::telemetry;

/// Configuration for [`PerformanceObserver`].
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub target_fps: f64,
    /// Frames kept in the fps rolling window.
    pub sample_window: usize,
    /// Samples kept in the memory rolling window.
    pub memory_window: usize,
    pub memory_interval: Duration,
    pub thresholds: IssueThresholds,
    /// Fallback estimate: cost of one live entity.
    pub bytes_per_entity: u64,
    /// Fallback estimate: total memory the entities share.
    pub memory_budget_bytes: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            sample_window: 60,
            memory_window: 30,
            memory_interval: Duration::from_secs(2),
            thresholds: IssueThresholds::default(),
            bytes_per_entity: 16 * 1024 * 1024,       // 16 MiB
            memory_budget_bytes: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

/// Immutable snapshot of the observer's derived metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub average_fps: f64,
    pub current_fps: f64,
    pub render_time_ms: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_percentage: f64,
    pub average_memory_percentage: f64,
    pub frame_count: u64,
    /// Samples currently in the fps window.
    pub sample_count: usize,
}

/// Delivered to issue subscribers on every frame with at least one issue.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceNotification {
    pub issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub metrics: PerformanceMetrics,
    /// Consecutive checks, including this one, that found issues.
    pub consecutive_issues: u32,
}

type EntitySource = Box<dyn Fn() -> usize + Send + Sync>;

struct ObserverState {
    active: bool,
    target_fps: f64,
    last_frame: Option<Instant>,
    fps: RollingWindow,
    memory: RollingWindow,
    metrics: PerformanceMetrics,
    consecutive_issues: u32,
    memory_task: Option<CancellationToken>,
}

struct ObserverInner {
    config: ObserverConfig,
    state: Mutex<ObserverState>,
    probe: Box<dyn MemoryProbe>,
    entity_source: RwLock<Option<EntitySource>>,
    issues: EventHub<PerformanceNotification>,
}

/// Shared handle to the performance observer.
#[derive(Clone)]
pub struct PerformanceObserver {
    inner: Arc<ObserverInner>,
}

impl PerformanceObserver {
    /// Observer that estimates memory from the entity count only.
    pub fn new(config: ObserverConfig) -> Self {
        Self::with_probe(config, Box::new(NoMemoryProbe))
    }

    pub fn with_probe(config: ObserverConfig, probe: Box<dyn MemoryProbe>) -> Self {
        let state = ObserverState {
            active: false,
            target_fps: config.target_fps,
            last_frame: None,
            fps: RollingWindow::new(config.sample_window),
            memory: RollingWindow::new(config.memory_window),
            metrics: PerformanceMetrics::default(),
            consecutive_issues: 0,
            memory_task: None,
        };
        Self {
            inner: Arc::new(ObserverInner {
                config,
                state: Mutex::new(state),
                probe,
                entity_source: RwLock::new(None),
                issues: EventHub::new("performance_issue"),
            }),
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.inner.config
    }

    /// Count of live managed entities, used by the memory fallback estimate.
    pub fn set_entity_source<F>(&self, source: F)
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        *self.inner.entity_source.write() = Some(Box::new(source));
    }

    /// Issue-notification callback registry.
    pub fn issues(&self) -> &EventHub<PerformanceNotification> {
        &self.inner.issues
    }

    pub fn on_issues<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PerformanceNotification) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.issues.subscribe(handler)
    }

    /// Begin sampling. Returns false (and warns) if already active.
    ///
    /// Inside a tokio runtime this also starts the periodic memory sampler.
    pub fn start(&self) -> bool {
        let token = {
            let mut state = self.inner.state.lock();
            if state.active {
                tracing::warn!("performance observer already active");
                return false;
            }
            state.active = true;
            state.last_frame = None;
            let token = CancellationToken::new();
            state.memory_task = Some(token.clone());
            token
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let weak = Arc::downgrade(&self.inner);
                let period = self.inner.config.memory_interval.max(Duration::from_millis(1));
                handle.spawn(memory_sampler(weak, period, token));
            }
            Err(_) => tracing::debug!("no async runtime, memory sampling is manual"),
        }

        tracing::info!(target_fps = self.target_fps(), "performance observer started");
        true
    }

    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if !state.active {
            return;
        }
        state.active = false;
        state.last_frame = None;
        if let Some(token) = state.memory_task.take() {
            token.cancel();
        }
        tracing::info!("performance observer stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    pub fn target_fps(&self) -> f64 {
        self.inner.state.lock().target_fps
    }

    pub fn set_target_fps(&self, fps: f64) {
        if fps > 0.0 && fps.is_finite() {
            self.inner.state.lock().target_fps = fps;
        }
    }

    /// Per-frame step. Ignored while stopped; the first frame after start
    /// only establishes the baseline timestamp.
    pub fn record_frame(&self, now: Instant) {
        let (average_fps, delta_ms) = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            let Some(previous) = state.last_frame.replace(now) else {
                return;
            };
            let delta = now.saturating_duration_since(previous);
            if delta.is_zero() {
                return;
            }

            let delta_ms = delta.as_secs_f64() * 1000.0;
            let fps = 1000.0 / delta_ms;
            state.fps.push(fps);
            let average = state.fps.average();
            let samples = state.fps.len();

            let metrics = &mut state.metrics;
            metrics.current_fps = fps;
            metrics.average_fps = average;
            metrics.render_time_ms = delta_ms;
            metrics.frame_count += 1;
            metrics.sample_count = samples;
            (average, delta_ms)
        };

        telemetry::record_frame(average_fps, delta_ms);
        self.check_issues();
    }

    /// [`record_frame`](Self::record_frame) at the current instant.
    pub fn tick(&self) {
        self.record_frame(Instant::now());
    }

    /// Take one memory reading and fold it into the rolling metrics.
    pub fn sample_memory(&self) -> MemorySnapshot {
        let snapshot = match self.inner.probe.sample() {
            Some(snapshot) => snapshot,
            None => {
                let entities = self
                    .inner
                    .entity_source
                    .read()
                    .as_ref()
                    .map(|count| count())
                    .unwrap_or(0);
                MemorySnapshot::estimate(
                    entities,
                    self.inner.config.bytes_per_entity,
                    self.inner.config.memory_budget_bytes,
                )
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.memory.push(snapshot.percentage);
            let average = state.memory.average();
            let metrics = &mut state.metrics;
            metrics.memory_used_bytes = snapshot.used_bytes;
            metrics.memory_total_bytes = snapshot.total_bytes;
            metrics.memory_percentage = snapshot.percentage;
            metrics.average_memory_percentage = average;
        }

        telemetry::record_memory(snapshot.percentage);
        snapshot
    }

    /// Evaluate issue rules against the current metrics and notify
    /// subscribers when any fire.
    pub fn check_issues(&self) -> Vec<Issue> {
        let notification = {
            let mut state = self.inner.state.lock();
            let issues = self
                .inner
                .config
                .thresholds
                .detect(&state.metrics, state.target_fps);
            if issues.is_empty() {
                state.consecutive_issues = 0;
                return issues;
            }
            state.consecutive_issues = state.consecutive_issues.saturating_add(1);
            PerformanceNotification {
                recommendations: recommendations_for(&issues),
                issues,
                metrics: state.metrics,
                consecutive_issues: state.consecutive_issues,
            }
        };

        for issue in &notification.issues {
            telemetry::record_issue(issue.kind.as_str(), issue.severity.as_str());
        }
        self.inner.issues.publish(&notification);
        notification.issues
    }

    pub fn current_metrics(&self) -> PerformanceMetrics {
        self.inner.state.lock().metrics
    }

    pub fn consecutive_issues(&self) -> u32 {
        self.inner.state.lock().consecutive_issues
    }
}

async fn memory_sampler(observer: Weak<ObserverInner>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = observer.upgrade() else { break };
                PerformanceObserver { inner }.sample_memory();
            }
        }
    }
    tracing::debug!("memory sampler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_ignored_until_started() {
        let observer = PerformanceObserver::new(ObserverConfig::default());
        let t0 = Instant::now();
        observer.record_frame(t0);
        observer.record_frame(t0 + Duration::from_millis(16));
        assert_eq!(observer.current_metrics().frame_count, 0);
    }

    #[test]
    fn first_frame_sets_baseline_only() {
        let observer = PerformanceObserver::new(ObserverConfig::default());
        assert!(observer.start());
        let t0 = Instant::now();
        observer.record_frame(t0);
        assert_eq!(observer.current_metrics().sample_count, 0);

        observer.record_frame(t0 + Duration::from_millis(20));
        let metrics = observer.current_metrics();
        assert_eq!(metrics.sample_count, 1);
        assert!((metrics.current_fps - 50.0).abs() < 1e-6);
        assert!((metrics.render_time_ms - 20.0).abs() < 1e-6);
        observer.stop();
    }

    #[test]
    fn start_twice_is_rejected() {
        let observer = PerformanceObserver::new(ObserverConfig::default());
        assert!(observer.start());
        assert!(!observer.start());
        observer.stop();
        assert!(!observer.is_active());
        assert!(observer.start());
    }
}
