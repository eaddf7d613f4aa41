//! Quality selection and asset lifecycle.

mod asset;
mod collab;
mod level;
mod manager;
mod optimizer;

pub use asset::{AssetOptions, AssetState, DisplayHandle, ManagedAsset};
pub use collab::{AssetLoader, DisplayTarget, FnLoader, NullDisplay};
pub use level::{DistanceThresholds, Quality};
pub use manager::{
    ManagerStats, ManagerWarning, ModelLoadEvent, OptimizationEndEvent, OptimizationStartEvent,
    QualityChangeEvent, QualityManager, QualityManagerConfig, MAX_OPTIMIZATION_DEBOUNCE,
};
pub use optimizer::{OptimizationReport, OptimizationState};
