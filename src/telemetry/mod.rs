//! Telemetry for the LOD core.
//!
//! Structured logging, transition spans, and metric recorders. The library
//! only emits; installing a subscriber or metrics exporter is up to the host.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_cache_eviction, record_cache_lookup, record_cache_usage, record_exhausted,
    record_fallback, record_frame, record_issue, record_load_time, record_memory,
    record_optimization, record_quality_change,
};
pub use spans::{SpanExt, TransitionSpan};
