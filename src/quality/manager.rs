//! Quality manager: asset registry, distance-driven transitions, and the
//! reaction side of the performance feedback loop.
//!
//! Every transition walks down the quality tiers until one loads, so an
//! asset only fails outright when even its low tier cannot be produced.
//! Optimization passes are debounced; only the last trigger in a burst runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use super::asset::{AssetOptions, AssetState, ManagedAsset};
use super::collab::{AssetLoader, DisplayTarget};
use super::level::{DistanceThresholds, Quality};
use super::optimizer::{OptimizationReport, OptimizationState, Optimizer, RunGuard};
use crate::cache::{CacheKey, CacheWeight, ContentCache};
use crate::error::{LoadError, QualityError};
use crate::events::{EventHub, SubscriptionId};
use crate::perf::{PerformanceMetrics, PerformanceObserver, Recommendation};
use crate::telemetry::{self, SpanExt, TransitionSpan};

/// Longest accepted optimization debounce window.
pub const MAX_OPTIMIZATION_DEBOUNCE: Duration = Duration::from_secs(3600);

/// Configuration for [`QualityManager`].
#[derive(Debug, Clone)]
pub struct QualityManagerConfig {
    pub default_thresholds: DistanceThresholds,
    pub default_priority: u32,
    pub target_fps: f64,
    /// Optimization downgrades when average fps < target × this.
    pub fps_downgrade_ratio: f64,
    /// Optimization evicts cache entries above this memory percentage.
    pub memory_cleanup_percent: f64,
    /// Fraction of cache entries evicted by a memory cleanup, rounded up.
    pub memory_cleanup_fraction: f64,
    /// Fraction of loaded assets unloaded by `ReduceActiveModels`, rounded up.
    pub reduce_active_fraction: f64,
    /// Capped at [`MAX_OPTIMIZATION_DEBOUNCE`] when scheduling.
    pub optimization_debounce: Duration,
    /// Observer issue frames between two reactions.
    pub sustained_issue_frames: u32,
    /// Unload assets not updated for this long. Disabled when `None`.
    pub idle_unload_after: Option<Duration>,
}

impl Default for QualityManagerConfig {
    fn default() -> Self {
        Self {
            default_thresholds: DistanceThresholds::default(),
            default_priority: 1,
            target_fps: 60.0,
            fps_downgrade_ratio: 0.8,
            memory_cleanup_percent: 80.0,
            memory_cleanup_fraction: 0.25,
            reduce_active_fraction: 0.3,
            optimization_debounce: Duration::from_secs(1),
            sustained_issue_frames: 30,
            idle_unload_after: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelLoadEvent {
    pub asset_id: String,
    pub quality: Quality,
    /// Loaded into the cache only, not attached.
    pub preload: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityChangeEvent {
    pub asset_id: String,
    pub previous: Option<Quality>,
    pub new: Quality,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationStartEvent {
    pub metrics: PerformanceMetrics,
    pub target_fps: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationEndEvent {
    pub metrics: PerformanceMetrics,
    pub report: OptimizationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerWarning {
    pub asset_id: String,
    pub message: String,
}

/// Registry and counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub registered: usize,
    pub loaded: usize,
    pub visible: usize,
    pub loading: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub quality_changes: u64,
    pub fallbacks: u64,
    pub exhausted: u64,
    pub optimizations_run: u64,
}

#[derive(Default)]
struct Counters {
    quality_changes: AtomicU64,
    fallbacks: AtomicU64,
    exhausted: AtomicU64,
    optimizations: AtomicU64,
}

struct ManagerInner<I> {
    config: QualityManagerConfig,
    assets: Mutex<HashMap<String, ManagedAsset>>,
    /// Serializes apply + publish so change events keep request order.
    emit_order: Mutex<()>,
    cache: ContentCache<I>,
    loader: Arc<dyn AssetLoader<I>>,
    display: Arc<dyn DisplayTarget<I>>,
    observer: RwLock<Option<PerformanceObserver>>,
    optimizer: Mutex<Optimizer>,
    counters: Counters,
    model_loads: EventHub<ModelLoadEvent>,
    quality_changes: EventHub<QualityChangeEvent>,
    optimization_starts: EventHub<OptimizationStartEvent>,
    optimization_ends: EventHub<OptimizationEndEvent>,
    warnings: EventHub<ManagerWarning>,
}

/// Shared handle to the quality manager.
pub struct QualityManager<I> {
    inner: Arc<ManagerInner<I>>,
}

impl<I> Clone for QualityManager<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> QualityManager<I>
where
    I: CacheWeight + Clone + Send + Sync + 'static,
{
    pub fn new(
        config: QualityManagerConfig,
        cache: ContentCache<I>,
        loader: Arc<dyn AssetLoader<I>>,
        display: Arc<dyn DisplayTarget<I>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                assets: Mutex::new(HashMap::new()),
                emit_order: Mutex::new(()),
                cache,
                loader,
                display,
                observer: RwLock::new(None),
                optimizer: Mutex::new(Optimizer::default()),
                counters: Counters::default(),
                model_loads: EventHub::new("model_load"),
                quality_changes: EventHub::new("quality_change"),
                optimization_starts: EventHub::new("optimization_start"),
                optimization_ends: EventHub::new("optimization_end"),
                warnings: EventHub::new("warning"),
            }),
        }
    }

    pub fn config(&self) -> &QualityManagerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &ContentCache<I> {
        &self.inner.cache
    }

    pub fn model_loads(&self) -> &EventHub<ModelLoadEvent> {
        &self.inner.model_loads
    }

    pub fn quality_changes(&self) -> &EventHub<QualityChangeEvent> {
        &self.inner.quality_changes
    }

    pub fn optimization_starts(&self) -> &EventHub<OptimizationStartEvent> {
        &self.inner.optimization_starts
    }

    pub fn optimization_ends(&self) -> &EventHub<OptimizationEndEvent> {
        &self.inner.optimization_ends
    }

    pub fn warnings(&self) -> &EventHub<ManagerWarning> {
        &self.inner.warnings
    }

    // -- registry ---------------------------------------------------------

    /// Add an asset to the registry.
    ///
    /// With `options.preload` set and a low tier source present, the low
    /// tier is fetched into the cache in the background. A failed preload
    /// is logged and does not affect registration.
    pub fn register<S, L>(
        &self,
        id: impl Into<String>,
        sources: S,
        options: AssetOptions,
    ) -> Result<(), QualityError>
    where
        S: IntoIterator<Item = (Quality, L)>,
        L: Into<String>,
    {
        let id = id.into();
        if id.is_empty() {
            return Err(QualityError::InvalidAsset("asset id cannot be empty".into()));
        }
        let sources: BTreeMap<Quality, String> =
            sources.into_iter().map(|(q, l)| (q, l.into())).collect();
        if sources.is_empty() {
            return Err(QualityError::InvalidAsset(format!(
                "{id}: at least one quality source is required"
            )));
        }
        if let Some((quality, _)) = sources.iter().find(|(_, l)| l.is_empty()) {
            return Err(QualityError::InvalidAsset(format!(
                "{id}: empty source locator for {quality} quality"
            )));
        }

        let preload = options.preload && sources.contains_key(&Quality::Low);
        {
            let mut assets = self.inner.assets.lock();
            if assets.contains_key(&id) {
                return Err(QualityError::InvalidAsset(format!("{id}: already registered")));
            }
            let asset = ManagedAsset::new(
                id.clone(),
                sources,
                options,
                self.inner.config.default_thresholds,
                self.inner.config.default_priority,
            );
            assets.insert(id.clone(), asset);
        }
        tracing::info!(asset = %id, preload, "asset registered");

        if preload {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let manager = self.clone();
                    handle.spawn(async move {
                        if let Err(error) = manager.preload(&id).await {
                            tracing::warn!(asset = %id, %error, "preload failed");
                        }
                    });
                }
                Err(_) => tracing::debug!(asset = %id, "no async runtime, preload skipped"),
            }
        }
        Ok(())
    }

    /// Fetch the low tier of `id` into the cache without attaching it.
    pub async fn preload(&self, id: &str) -> Result<(), QualityError> {
        let locator = {
            let assets = self.inner.assets.lock();
            let asset = assets
                .get(id)
                .ok_or_else(|| QualityError::UnknownAsset(id.to_string()))?;
            asset.source(Quality::Low).map(str::to_string)
        };
        let result = match locator {
            Some(locator) => self.load_instance(id, Quality::Low, locator).await,
            None => Err(LoadError::MissingSource {
                asset: id.to_string(),
                quality: Quality::Low,
            }),
        };

        match result {
            Ok(_) => {
                self.inner.model_loads.publish(&ModelLoadEvent {
                    asset_id: id.to_string(),
                    quality: Quality::Low,
                    preload: true,
                });
                Ok(())
            }
            Err(error) => Err(QualityError::Exhausted {
                asset: id.to_string(),
                attempts: vec![(Quality::Low, error)],
            }),
        }
    }

    /// Remove `id` from the registry, detaching any display content.
    pub fn unregister(&self, id: &str) -> Result<(), QualityError> {
        let removed = self.inner.assets.lock().remove(id);
        let asset = removed.ok_or_else(|| QualityError::UnknownAsset(id.to_string()))?;
        if let (true, Some(handle)) = (asset.attached, asset.display) {
            if let Err(error) = self.inner.display.detach(handle) {
                tracing::warn!(asset = %id, %error, "detach failed during unregister");
            }
        }
        tracing::info!(asset = %id, "asset unregistered");
        Ok(())
    }

    pub fn set_position(&self, id: &str, position: Vec3) -> Result<(), QualityError> {
        self.with_asset(id, |asset| asset.position = Some(position))
    }

    pub fn set_hidden(&self, id: &str, hidden: bool) -> Result<(), QualityError> {
        self.with_asset(id, |asset| {
            asset.hidden = hidden;
            if hidden {
                asset.visible = false;
            }
        })
    }

    fn with_asset<F>(&self, id: &str, f: F) -> Result<(), QualityError>
    where
        F: FnOnce(&mut ManagedAsset),
    {
        let mut assets = self.inner.assets.lock();
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| QualityError::UnknownAsset(id.to_string()))?;
        f(asset);
        Ok(())
    }

    /// Snapshot of one asset record.
    pub fn asset(&self, id: &str) -> Option<ManagedAsset> {
        self.inner.assets.lock().get(id).cloned()
    }

    pub fn asset_state(&self, id: &str) -> Option<AssetState> {
        self.inner.assets.lock().get(id).map(ManagedAsset::state)
    }

    pub fn asset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.assets.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.assets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.assets.lock().is_empty()
    }

    pub fn stats(&self) -> ManagerStats {
        let mut stats = {
            let assets = self.inner.assets.lock();
            let mut stats = ManagerStats {
                registered: assets.len(),
                ..Default::default()
            };
            for asset in assets.values() {
                if asset.visible {
                    stats.visible += 1;
                }
                match asset.state() {
                    AssetState::Loading(_) => stats.loading += 1,
                    AssetState::Loaded(_) | AssetState::Unloaded => {}
                }
                if asset.loaded {
                    stats.loaded += 1;
                    match asset.current_quality {
                        Some(Quality::High) => stats.high += 1,
                        Some(Quality::Medium) => stats.medium += 1,
                        Some(Quality::Low) => stats.low += 1,
                        None => {}
                    }
                }
            }
            stats
        };
        let counters = &self.inner.counters;
        stats.quality_changes = counters.quality_changes.load(Ordering::Relaxed);
        stats.fallbacks = counters.fallbacks.load(Ordering::Relaxed);
        stats.exhausted = counters.exhausted.load(Ordering::Relaxed);
        stats.optimizations_run = counters.optimizations.load(Ordering::Relaxed);
        stats
    }

    // -- transitions ------------------------------------------------------

    /// Re-evaluate `id` from `viewpoint` and transition if its target tier
    /// changed. Returns the tier reached by a transition, if one ran.
    ///
    /// An unregistered id is a warning, not an error.
    pub async fn update_for_viewpoint(
        &self,
        id: &str,
        viewpoint: Vec3,
    ) -> Result<Option<Quality>, QualityError> {
        let decision = {
            let mut assets = self.inner.assets.lock();
            assets.get_mut(id).map(|asset| {
                let distance = asset.distance_to(viewpoint);
                asset.last_distance = distance;
                asset.last_update = Instant::now();
                asset.visible = !asset.hidden;

                let target = asset.thresholds.select(distance);
                let settled = match asset.pending_quality {
                    Some(pending) => Some(pending),
                    None if asset.loaded => asset.current_quality,
                    None => None,
                };
                (settled != Some(target)).then_some(target)
            })
        };

        match decision {
            None => {
                self.warn_unknown(id, "viewpoint update for unregistered asset");
                Ok(None)
            }
            Some(Some(target)) => self.transition_quality(id, target).await.map(Some),
            Some(None) => Ok(None),
        }
    }

    /// Load `target` for `id` and attach it, falling back one tier at a
    /// time on load failure. Returns the tier actually reached.
    pub async fn transition_quality(
        &self,
        id: &str,
        target: Quality,
    ) -> Result<Quality, QualityError> {
        let (seq, chain) = {
            let mut assets = self.inner.assets.lock();
            let asset = assets
                .get_mut(id)
                .ok_or_else(|| QualityError::UnknownAsset(id.to_string()))?;
            asset.request_seq += 1;
            asset.pending_quality = Some(target);
            (asset.request_seq, asset.fallback_chain(target))
        };

        let span = TransitionSpan::new(id, target);
        let result = self
            .run_transition(id, seq, chain)
            .instrument(span.clone())
            .await;
        span.record_result(&result);
        result
    }

    async fn run_transition(
        &self,
        id: &str,
        seq: u64,
        chain: Vec<(Quality, Option<String>)>,
    ) -> Result<Quality, QualityError> {
        let mut attempts: Vec<(Quality, LoadError)> = Vec::new();

        for (quality, locator) in chain {
            let result = match locator {
                Some(locator) => self.load_instance(id, quality, locator).await,
                None => Err(LoadError::MissingSource {
                    asset: id.to_string(),
                    quality,
                }),
            };

            match result {
                Ok(instance) => {
                    tracing::Span::current().record("fallbacks", attempts.len());
                    self.apply(id, seq, quality, &instance);
                    return Ok(quality);
                }
                Err(error) => {
                    if quality != Quality::Low {
                        tracing::warn!(asset = %id, %quality, %error, "load failed, falling back");
                        self.inner.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                        telemetry::record_fallback();
                    }
                    attempts.push((quality, error));
                }
            }
        }

        {
            let mut assets = self.inner.assets.lock();
            if let Some(asset) = assets.get_mut(id) {
                if asset.request_seq == seq {
                    asset.pending_quality = None;
                }
            }
        }
        self.inner.counters.exhausted.fetch_add(1, Ordering::Relaxed);
        telemetry::record_exhausted();
        tracing::error!(asset = %id, attempts = attempts.len(), "no quality tier could be loaded");
        Err(QualityError::Exhausted {
            asset: id.to_string(),
            attempts,
        })
    }

    async fn load_instance(
        &self,
        id: &str,
        quality: Quality,
        locator: String,
    ) -> Result<I, LoadError> {
        let key = CacheKey::new(id, quality);
        let metadata = serde_json::json!({
            "asset": id,
            "quality": quality.as_str(),
            "locator": locator.as_str(),
        });
        let loader = Arc::clone(&self.inner.loader);
        self.inner
            .cache
            .get_or_load(
                &key,
                move || async move { loader.load(&locator).await },
                metadata,
            )
            .await
    }

    /// Attach a loaded instance unless a newer transition or an unload has
    /// already superseded this one.
    fn apply(&self, id: &str, seq: u64, quality: Quality, instance: &I) {
        let _order = self.inner.emit_order.lock();
        let change = {
            let mut assets = self.inner.assets.lock();
            let Some(asset) = assets.get_mut(id) else {
                tracing::debug!(asset = %id, "asset unregistered during transition");
                return;
            };
            if seq <= asset.applied_seq {
                tracing::debug!(asset = %id, %quality, seq, "stale transition result dropped");
                return;
            }
            asset.applied_seq = seq;
            if asset.request_seq == seq {
                asset.pending_quality = None;
            }

            let previous = asset.current_quality;
            let unchanged = previous == Some(quality) && asset.loaded;
            match asset.display {
                Some(_) if unchanged && asset.attached => {}
                Some(handle) => {
                    if asset.attached {
                        if let Err(error) = self.inner.display.detach(handle) {
                            tracing::warn!(asset = %id, %error, "detach failed");
                        }
                    }
                    asset.attached = match self.inner.display.attach(handle, instance, quality) {
                        Ok(()) => true,
                        Err(error) => {
                            tracing::warn!(asset = %id, %quality, %error, "attach failed");
                            false
                        }
                    };
                }
                None => {}
            }
            asset.current_quality = Some(quality);
            asset.loaded = true;

            if unchanged {
                None
            } else {
                asset.quality_changes += 1;
                Some(QualityChangeEvent {
                    asset_id: id.to_string(),
                    previous,
                    new: quality,
                })
            }
        };

        self.inner.model_loads.publish(&ModelLoadEvent {
            asset_id: id.to_string(),
            quality,
            preload: false,
        });
        if let Some(change) = change {
            self.inner
                .counters
                .quality_changes
                .fetch_add(1, Ordering::Relaxed);
            telemetry::record_quality_change(change.previous, change.new);
            tracing::debug!(
                asset = %id,
                previous = ?change.previous,
                new = %change.new,
                "quality changed"
            );
            self.inner.quality_changes.publish(&change);
        }
    }

    /// Drop `id` one tier. Returns the new tier, or `None` if the asset was
    /// not loaded or already at `Low`.
    pub async fn downgrade(&self, id: &str) -> Result<Option<Quality>, QualityError> {
        let next = {
            let assets = self.inner.assets.lock();
            let asset = assets
                .get(id)
                .ok_or_else(|| QualityError::UnknownAsset(id.to_string()))?;
            match (asset.loaded, asset.current_quality) {
                (true, Some(current)) => current.lower(),
                _ => None,
            }
        };
        match next {
            Some(next) => self.transition_quality(id, next).await.map(Some),
            None => Ok(None),
        }
    }

    /// Detach and mark `id` unloaded. Returns false if it already was, or
    /// if `id` is not registered.
    pub fn unload(&self, id: &str) -> Result<bool, QualityError> {
        let mut assets = self.inner.assets.lock();
        let Some(asset) = assets.get_mut(id) else {
            tracing::debug!(asset = %id, "unload of unregistered asset ignored");
            return Ok(false);
        };

        if let (true, Some(handle)) = (asset.attached, asset.display) {
            if let Err(error) = self.inner.display.detach(handle) {
                tracing::warn!(asset = %id, %error, "detach failed during unload");
            }
        }
        let was_loaded = asset.loaded || asset.pending_quality.is_some();
        asset.attached = false;
        asset.loaded = false;
        asset.current_quality = None;
        asset.pending_quality = None;
        asset.applied_seq = asset.request_seq;
        drop(assets);

        if was_loaded {
            tracing::debug!(asset = %id, "asset unloaded");
        }
        Ok(was_loaded)
    }

    /// Unload assets not updated within `max_idle`. Returns how many.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let idle: Vec<String> = self
            .inner
            .assets
            .lock()
            .values()
            .filter(|a| a.loaded && now.saturating_duration_since(a.last_update) > max_idle)
            .map(|a| a.id.clone())
            .collect();
        let count = self.unload_all(&idle);
        if count > 0 {
            tracing::info!(count, "idle assets unloaded");
        }
        count
    }

    /// Unload loaded assets whose last seen distance is beyond `far`.
    pub fn unload_distant_models(&self) -> usize {
        let distant: Vec<String> = self
            .inner
            .assets
            .lock()
            .values()
            .filter(|a| a.loaded && a.last_distance > a.thresholds.far())
            .map(|a| a.id.clone())
            .collect();
        self.unload_all(&distant)
    }

    fn unload_all(&self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| matches!(self.unload(id), Ok(true)))
            .count()
    }

    fn loaded_ids<F>(&self, filter: F) -> Vec<String>
    where
        F: Fn(&ManagedAsset) -> bool,
    {
        let mut ids: Vec<String> = self
            .inner
            .assets
            .lock()
            .values()
            .filter(|a| a.loaded && filter(a))
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn downgrade_all(&self, ids: Vec<String>) -> usize {
        let mut downgraded = 0;
        for id in ids {
            match self.downgrade(&id).await {
                Ok(Some(_)) => downgraded += 1,
                Ok(None) => {}
                Err(error) => tracing::warn!(asset = %id, %error, "downgrade failed"),
            }
        }
        downgraded
    }

    fn warn_unknown(&self, id: &str, message: &str) {
        tracing::warn!(asset = %id, "{message}");
        self.inner.warnings.publish(&ManagerWarning {
            asset_id: id.to_string(),
            message: message.to_string(),
        });
    }

    // -- performance feedback ---------------------------------------------

    /// Execute recommended corrective actions.
    pub async fn apply_recommendations(
        &self,
        recommendations: &[Recommendation],
    ) -> OptimizationReport {
        let mut report = OptimizationReport::default();
        for recommendation in recommendations {
            match recommendation {
                Recommendation::ReduceModelQuality => {
                    let ids = self.loaded_ids(|a| {
                        matches!(a.current_quality, Some(Quality::High | Quality::Medium))
                    });
                    report.downgraded += self.downgrade_all(ids).await;
                }
                Recommendation::ClearCache => {
                    report.evicted += self.inner.cache.clear();
                }
                Recommendation::ReduceActiveModels => {
                    let mut loaded: Vec<(u32, String)> = self
                        .inner
                        .assets
                        .lock()
                        .values()
                        .filter(|a| a.loaded)
                        .map(|a| (a.priority, a.id.clone()))
                        .collect();
                    loaded.sort();
                    let count =
                        fraction_ceil(loaded.len(), self.inner.config.reduce_active_fraction);
                    let ids: Vec<String> =
                        loaded.into_iter().take(count).map(|(_, id)| id).collect();
                    report.unloaded += self.unload_all(&ids);
                }
                Recommendation::UnloadDistantModels => {
                    report.unloaded += self.unload_distant_models();
                }
                Recommendation::OptimizeLodDistances
                | Recommendation::ReduceDrawCalls
                | Recommendation::OptimizeMaterials => {
                    tracing::debug!(
                        recommendation = recommendation.as_str(),
                        "no manager action for recommendation"
                    );
                }
            }
        }
        tracing::info!(?report, "recommendations applied");
        report
    }

    /// Debounced trigger for [`run_optimization`](Self::run_optimization).
    /// Each call cancels the previously scheduled pass.
    pub fn schedule_optimization(&self) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, optimization not scheduled");
            return false;
        };
        let debounce = self
            .inner
            .config
            .optimization_debounce
            .min(MAX_OPTIMIZATION_DEBOUNCE);
        let deadline = Instant::now() + debounce;

        let mut optimizer = self.inner.optimizer.lock();
        let generation = optimizer.reschedule();
        let weak = Arc::downgrade(&self.inner);
        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else { return };
            let fired = inner.optimizer.lock().fire(generation);
            if fired {
                QualityManager { inner }.run_optimization(None).await;
            }
        });
        optimizer.set_pending(generation, deadline, task.abort_handle());
        true
    }

    pub fn optimization_state(&self) -> OptimizationState {
        self.inner.optimizer.lock().state()
    }

    /// Drop a scheduled optimization pass, if any.
    pub fn cancel_optimization(&self) {
        self.inner.optimizer.lock().cancel();
    }

    /// One optimization pass. Returns `None` if a pass is already running.
    pub async fn run_optimization(&self, target_fps: Option<f64>) -> Option<OptimizationReport> {
        let Some(_running) = RunGuard::acquire(&self.inner.optimizer) else {
            tracing::debug!("optimization already running, skipped");
            return None;
        };
        let config = &self.inner.config;
        let target_fps = target_fps.unwrap_or(config.target_fps);
        let metrics = self.current_metrics();

        self.inner
            .optimization_starts
            .publish(&OptimizationStartEvent { metrics, target_fps });

        let mut report = OptimizationReport::default();
        if metrics.sample_count > 0
            && metrics.average_fps < target_fps * config.fps_downgrade_ratio
        {
            report.fps_triggered = true;
            let ids = self.loaded_ids(|a| a.visible);
            report.downgraded = self.downgrade_all(ids).await;
        }

        if metrics.memory_percentage > config.memory_cleanup_percent {
            report.memory_triggered = true;
            let cache = &self.inner.cache;
            let count = fraction_ceil(cache.len(), config.memory_cleanup_fraction);
            report.evicted = cache
                .least_recently_used(count)
                .iter()
                .filter(|key| cache.delete(key))
                .count();
        }

        self.inner
            .counters
            .optimizations
            .fetch_add(1, Ordering::Relaxed);
        telemetry::record_optimization();
        tracing::info!(?report, average_fps = metrics.average_fps, "optimization pass finished");

        self.inner.optimization_ends.publish(&OptimizationEndEvent {
            metrics: self.current_metrics(),
            report,
        });
        Some(report)
    }

    fn current_metrics(&self) -> PerformanceMetrics {
        self.inner
            .observer
            .read()
            .as_ref()
            .map(PerformanceObserver::current_metrics)
            .unwrap_or_default()
    }

    /// Wire this manager into `observer`.
    ///
    /// The observer's memory estimate counts this manager's loaded assets;
    /// every `sustained_issue_frames` consecutive issue frames the
    /// recommendations are applied and an optimization pass is scheduled.
    pub fn attach_to_observer(&self, observer: &PerformanceObserver) -> SubscriptionId {
        *self.inner.observer.write() = Some(observer.clone());

        let weak = Arc::downgrade(&self.inner);
        observer.set_entity_source(move || {
            weak.upgrade()
                .map(|inner| inner.assets.lock().values().filter(|a| a.loaded).count())
                .unwrap_or(0)
        });

        let weak = Arc::downgrade(&self.inner);
        let every = self.inner.config.sustained_issue_frames.max(1);
        observer.on_issues(move |notification| {
            if notification.consecutive_issues % every != 0 {
                return Ok(());
            }
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let handle = tokio::runtime::Handle::try_current()?;
            let manager = QualityManager { inner };
            let recommendations = notification.recommendations.clone();
            tracing::info!(
                consecutive = notification.consecutive_issues,
                ?recommendations,
                "sustained performance issues"
            );
            handle.spawn(async move {
                manager.apply_recommendations(&recommendations).await;
                manager.schedule_optimization();
            });
            Ok(())
        })
    }
}

fn fraction_ceil(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).ceil() as usize).min(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_rounds_up_and_clamps() {
        assert_eq!(fraction_ceil(10, 0.25), 3);
        assert_eq!(fraction_ceil(4, 0.25), 1);
        assert_eq!(fraction_ceil(1, 0.3), 1);
        assert_eq!(fraction_ceil(0, 0.3), 0);
        assert_eq!(fraction_ceil(3, 2.0), 3);
    }
}
