//! Managed asset records held by the quality manager.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::Serialize;
use tokio::time::Instant;

use super::level::{DistanceThresholds, Quality};

/// Opaque handle to a display node owned by the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DisplayHandle(pub u64);

/// Optional registration settings. Unset fields take the manager defaults.
#[derive(Debug, Clone, Default)]
pub struct AssetOptions {
    pub thresholds: Option<DistanceThresholds>,
    pub priority: Option<u32>,
    /// Warm the cache with the low tier right after registration.
    pub preload: bool,
    pub display: Option<DisplayHandle>,
    pub position: Option<Vec3>,
}

impl AssetOptions {
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_display(mut self, handle: DisplayHandle) -> Self {
        self.display = Some(handle);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_thresholds(mut self, thresholds: DistanceThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn preloaded(mut self) -> Self {
        self.preload = true;
        self
    }
}

/// Lifecycle state derived from an asset's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "quality", rename_all = "snake_case")]
pub enum AssetState {
    Unloaded,
    Loading(Quality),
    Loaded(Quality),
}

/// Registry record for one asset.
#[derive(Debug, Clone)]
pub struct ManagedAsset {
    pub id: String,
    pub sources: BTreeMap<Quality, String>,
    pub thresholds: DistanceThresholds,
    pub current_quality: Option<Quality>,
    pub pending_quality: Option<Quality>,
    pub loaded: bool,
    pub visible: bool,
    /// Explicitly hidden by the host; overrides visibility on update.
    pub hidden: bool,
    /// Display content currently attached to `display`.
    pub attached: bool,
    pub last_update: Instant,
    pub priority: u32,
    pub preload: bool,
    pub display: Option<DisplayHandle>,
    pub position: Option<Vec3>,
    /// Distance seen at the last viewpoint update.
    pub last_distance: f32,
    pub quality_changes: u64,
    pub(crate) request_seq: u64,
    pub(crate) applied_seq: u64,
}

impl ManagedAsset {
    pub(crate) fn new(
        id: String,
        sources: BTreeMap<Quality, String>,
        options: AssetOptions,
        default_thresholds: DistanceThresholds,
        default_priority: u32,
    ) -> Self {
        Self {
            id,
            sources,
            thresholds: options.thresholds.unwrap_or(default_thresholds),
            current_quality: None,
            pending_quality: None,
            loaded: false,
            visible: true,
            hidden: false,
            attached: false,
            last_update: Instant::now(),
            priority: options.priority.unwrap_or(default_priority),
            preload: options.preload,
            display: options.display,
            position: options.position,
            last_distance: f32::INFINITY,
            quality_changes: 0,
            request_seq: 0,
            applied_seq: 0,
        }
    }

    pub fn state(&self) -> AssetState {
        match (self.pending_quality, self.current_quality) {
            (Some(pending), _) => AssetState::Loading(pending),
            (None, Some(current)) if self.loaded => AssetState::Loaded(current),
            _ => AssetState::Unloaded,
        }
    }

    pub fn source(&self, quality: Quality) -> Option<&str> {
        self.sources.get(&quality).map(String::as_str)
    }

    /// Distance from `viewpoint`, or infinity if the asset has no position.
    pub fn distance_to(&self, viewpoint: Vec3) -> f32 {
        self.position
            .map(|p| p.distance(viewpoint))
            .unwrap_or(f32::INFINITY)
    }

    /// Tiers to try for `target`, from `target` down to `Low`, paired with
    /// their source locators.
    pub(crate) fn fallback_chain(&self, target: Quality) -> Vec<(Quality, Option<String>)> {
        std::iter::successors(Some(target), |q| q.lower())
            .map(|q| (q, self.sources.get(&q).cloned()))
            .collect()
    }
}
