//! Adaptive level-of-detail core.
//!
//! Selects and caches quality variants of renderable assets, trading visual
//! fidelity for frame rate and memory headroom as viewing distance and
//! runtime performance change.
//!
//! # Components
//!
//! - [`perf::PerformanceObserver`]: frame timing and memory sampling, issue
//!   classification, recommended actions
//! - [`cache::ContentCache`]: byte- and count-bounded LRU store with shared
//!   in-flight loads
//! - [`quality::QualityManager`]: asset registry, distance-driven transitions
//!   with tier fallback, reactions to performance issues
//!
//! [`LodSystem`] wires the three together. There is no global instance;
//! every handle is constructed explicitly and cloned where needed.

pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod health;
pub mod perf;
pub mod quality;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use cache::{CacheKey, CacheWeight, ContentCache, ContentCacheConfig};
pub use config::{ConfigError, ConfigViolation, LodConfig};
pub use device::{DeviceCapabilities, DeviceTier, RecommendedSettings};
pub use error::{CacheError, CallbackError, DisplayError, LoadError, QualityError};
pub use health::{HealthChecker, HealthState, SystemReport};
pub use perf::{MemoryProbe, NoMemoryProbe, PerformanceObserver, SystemMemoryProbe};
pub use quality::{
    AssetLoader, AssetOptions, DisplayHandle, DisplayTarget, DistanceThresholds, Quality,
    QualityManager,
};

/// Lifecycle of a [`LodSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Idle,
    Running,
    Stopped,
}

/// Result of [`LodSystem::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: usize },
}

struct Background {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// A fully wired LOD system: cache, observer and manager built from one
/// validated configuration.
pub struct LodSystem<I> {
    pub cache: ContentCache<I>,
    pub observer: PerformanceObserver,
    pub manager: QualityManager<I>,
    config: LodConfig,
    health: HealthChecker,
    state: Mutex<SystemState>,
    background: Mutex<Option<Background>>,
}

impl<I> LodSystem<I>
where
    I: CacheWeight + Clone + Send + Sync + 'static,
{
    /// Build a system whose memory readings are estimated from the number
    /// of loaded assets.
    pub fn new(
        config: LodConfig,
        loader: Arc<dyn AssetLoader<I>>,
        display: Arc<dyn DisplayTarget<I>>,
    ) -> Result<Self, ConfigError> {
        Self::with_probe(config, loader, display, Box::new(NoMemoryProbe))
    }

    pub fn with_probe(
        config: LodConfig,
        loader: Arc<dyn AssetLoader<I>>,
        display: Arc<dyn DisplayTarget<I>>,
        probe: Box<dyn MemoryProbe>,
    ) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::Invalid)?;

        let cache = ContentCache::new(config.cache.clone());
        let observer = PerformanceObserver::with_probe(config.observer.clone(), probe);
        let manager = QualityManager::new(config.manager.clone(), cache.clone(), loader, display);
        manager.attach_to_observer(&observer);

        Ok(Self {
            cache,
            observer,
            manager,
            config,
            health: HealthChecker::default(),
            state: Mutex::new(SystemState::Idle),
            background: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn state(&self) -> SystemState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SystemState::Running
    }

    /// Start observation, cache maintenance and idle eviction.
    ///
    /// Must be called from within a tokio runtime. Returns false if the
    /// system is already running or no runtime is available.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SystemState::Running {
            tracing::warn!("LOD system already running");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("LOD system needs a tokio runtime to start");
            return false;
        }

        let token = CancellationToken::new();
        let mut tasks = vec![self.cache.spawn_maintenance(token.child_token())];
        if let Some(max_idle) = self.config.manager.idle_unload_after {
            tasks.push(spawn_idle_eviction(
                self.manager.clone(),
                max_idle,
                token.child_token(),
            ));
        }
        self.observer.start();

        *self.background.lock() = Some(Background { token, tasks });
        *state = SystemState::Running;
        tracing::info!("LOD system started");
        true
    }

    /// Stop background work and wait up to `timeout` for it to finish.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        {
            let mut state = self.state.lock();
            if *state != SystemState::Running {
                return ShutdownResult::Complete;
            }
            *state = SystemState::Stopped;
        }
        self.observer.stop();
        self.manager.cancel_optimization();

        let background = self.background.lock().take();
        let Some(Background { token, tasks }) = background else {
            return ShutdownResult::Complete;
        };
        token.cancel();

        let total = tasks.len();
        let mut finished = 0;
        let drain = async {
            for task in tasks {
                // A panicked task has nothing left to clean up.
                let _ = task.await;
                finished += 1;
            }
        };
        let outcome = tokio::time::timeout(timeout, drain).await;
        let result = match outcome {
            Ok(()) => ShutdownResult::Complete,
            Err(_) => ShutdownResult::Timeout {
                remaining: total - finished,
            },
        };
        tracing::info!(?result, "LOD system stopped");
        result
    }

    /// Combined health, asset, cache and performance report.
    pub fn report(&self) -> SystemReport {
        self.health.report(
            self.is_running(),
            self.observer.target_fps(),
            self.manager.stats(),
            self.cache.stats(),
            self.observer.current_metrics(),
        )
    }
}

fn spawn_idle_eviction<I>(
    manager: QualityManager<I>,
    max_idle: Duration,
    token: CancellationToken,
) -> JoinHandle<()>
where
    I: CacheWeight + Clone + Send + Sync + 'static,
{
    let period = (max_idle / 2).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    manager.evict_idle(max_idle);
                }
            }
        }
        tracing::debug!("idle eviction stopped");
    })
}
