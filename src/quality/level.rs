//! Quality tiers and the distance → quality decision rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QualityError;

/// Discrete level-of-detail tier. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Low, Quality::Medium, Quality::High];

    /// Next tier down, or `None` at `Low`.
    pub fn lower(self) -> Option<Quality> {
        match self {
            Quality::High => Some(Quality::Medium),
            Quality::Medium => Some(Quality::Low),
            Quality::Low => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-asset distance thresholds. Always `near < medium < far`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceThresholds {
    near: f32,
    medium: f32,
    far: f32,
}

impl DistanceThresholds {
    pub fn new(near: f32, medium: f32, far: f32) -> Result<Self, QualityError> {
        let finite = near.is_finite() && medium.is_finite() && far.is_finite();
        if !finite || near < 0.0 || !(near < medium && medium < far) {
            return Err(QualityError::InvalidAsset(format!(
                "distance thresholds must be finite, non-negative and strictly increasing (got {near}, {medium}, {far})"
            )));
        }
        Ok(Self { near, medium, far })
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn medium(&self) -> f32 {
        self.medium
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Map a viewing distance to a quality tier. Boundaries belong to the
    /// nearer (higher quality) band; NaN and infinity select `Low`.
    pub fn select(&self, distance: f32) -> Quality {
        if distance <= self.near {
            Quality::High
        } else if distance <= self.medium {
            Quality::Medium
        } else {
            Quality::Low
        }
    }
}

impl Default for DistanceThresholds {
    fn default() -> Self {
        Self {
            near: 10.0,
            medium: 50.0,
            far: 100.0,
        }
    }
}
