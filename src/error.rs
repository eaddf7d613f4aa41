//! Error types shared across the LOD core.
//!
//! Loader failures are recovered locally by quality fallback; only an
//! exhausted fallback chain reaches the caller.

use thiserror::Error;

use crate::quality::Quality;

/// Failure reported by an asset loader, or raised when no source exists
/// for the requested quality.
///
/// `Clone` so a single in-flight load can resolve every waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Load failed for {locator}: {reason}")]
    Failed { locator: String, reason: String },

    #[error("No source registered for {asset} at {quality} quality")]
    MissingSource { asset: String, quality: Quality },

    #[error("Loaded instance rejected: {0}")]
    Rejected(String),
}

impl LoadError {
    pub fn failed(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from direct cache insertion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Entry {key} too large to cache: {size} bytes exceeds limit {limit} bytes")]
    Overflow { key: String, size: usize, limit: usize },
}

/// Errors surfaced by the quality manager.
#[derive(Debug, Error)]
pub enum QualityError {
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Asset not registered: {0}")]
    UnknownAsset(String),

    /// Every tier down to `Low` failed. The asset keeps whatever it had
    /// attached before the transition was requested.
    #[error("Asset {asset} could not be loaded at any quality ({} attempts)", attempts.len())]
    Exhausted {
        asset: String,
        attempts: Vec<(Quality, LoadError)>,
    },
}

impl QualityError {
    /// Returns true if the error stems from caller input rather than loading.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidAsset(_) | Self::UnknownAsset(_))
    }
}

/// Failure reported by the external display collaborator.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Display node {0} no longer exists")]
    MissingNode(u64),

    #[error("Display operation failed: {0}")]
    Failed(String),
}

/// A subscriber failed while handling an event. Logged, never propagated.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Subscriber {subscriber} on '{hub}' failed: {message}")]
    Failed {
        hub: &'static str,
        subscriber: u64,
        message: String,
    },

    #[error("Subscriber {subscriber} on '{hub}' panicked")]
    Panicked { hub: &'static str, subscriber: u64 },
}
