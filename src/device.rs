//! Device capability input.
//!
//! Capability detection happens outside the core; this is the data it
//! hands over once at initialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    Low,
    Medium,
    High,
}

impl DeviceTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Budgets suggested for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedSettings {
    /// Near, medium and far LOD distances.
    pub lod_distances: [f32; 3],
    pub target_fps: f64,
    pub max_models: usize,
    pub cache_size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub tier: DeviceTier,
    pub recommended: RecommendedSettings,
}

impl DeviceCapabilities {
    /// Stock settings for a tier.
    pub fn for_tier(tier: DeviceTier) -> Self {
        const MIB: usize = 1024 * 1024;
        let recommended = match tier {
            DeviceTier::Low => RecommendedSettings {
                lod_distances: [5.0, 20.0, 50.0],
                target_fps: 30.0,
                max_models: 20,
                cache_size_bytes: 64 * MIB,
            },
            DeviceTier::Medium => RecommendedSettings {
                lod_distances: [10.0, 50.0, 100.0],
                target_fps: 60.0,
                max_models: 50,
                cache_size_bytes: 128 * MIB,
            },
            DeviceTier::High => RecommendedSettings {
                lod_distances: [20.0, 80.0, 150.0],
                target_fps: 60.0,
                max_models: 100,
                cache_size_bytes: 256 * MIB,
            },
        };
        Self { tier, recommended }
    }
}
