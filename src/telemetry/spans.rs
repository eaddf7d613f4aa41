//! Span utilities for quality transitions.

use tracing::{info_span, Span};

use crate::quality::Quality;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for quality transition spans.
pub struct TransitionSpan;

impl TransitionSpan {
    /// Fields:
    /// - `asset`, `target`: set on creation
    /// - `status`, `error.message`: filled by `SpanExt::record_result`
    /// - `fallbacks`: tiers skipped before a load succeeded
    pub fn new(asset: &str, target: Quality) -> Span {
        info_span!(
            "quality_transition",
            asset = %asset,
            target = %target,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            fallbacks = tracing::field::Empty,
        )
    }
}
