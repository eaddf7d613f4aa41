//! Telemetry module tests for the LOD core.

use std::path::PathBuf;
use std::time::Duration;

use lod_core::quality::Quality;
use lod_core::telemetry::{
    init_logging, record_cache_eviction, record_cache_lookup, record_cache_usage,
    record_exhausted, record_fallback, record_frame, record_issue, record_load_time,
    record_memory, record_optimization, record_quality_change, LogConfig, LogError, LogFormat,
    SpanExt, TransitionSpan,
};
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "lod_core::quality=debug".to_string(),
        output_path: Some(PathBuf::from("/tmp/lod.log")),
    };
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/lod.log")));
}

#[test]
fn log_format_parse() {
    assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
    assert_eq!(LogFormat::parse(" Pretty "), Some(LogFormat::Pretty));
    assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
    assert_eq!(LogFormat::parse("xml"), None);
}

#[test]
fn init_logging_rejects_bad_filter() {
    let config = LogConfig {
        level: "lod_core=verbose".to_string(),
        ..Default::default()
    };
    assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_invalid_filter_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(error.to_string().contains("bad filter"));
}

#[test]
fn log_error_file_open_display() {
    let error = LogError::FileOpen("permission denied".to_string());
    assert!(error.to_string().contains("Failed to open log file"));
}

#[test]
fn log_error_already_initialized_display() {
    assert_eq!(
        LogError::AlreadyInitialized.to_string(),
        "Subscriber already initialized"
    );
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_record_result_ok() {
    let span = Span::none();
    let result: Result<u32, String> = Ok(1);
    span.record_result(&result);
}

#[test]
fn span_ext_record_result_err() {
    let span = Span::none();
    let result: Result<u32, String> = Err("load failed".to_string());
    span.record_result(&result);
}

#[test]
fn transition_span_creates_without_panic() {
    for quality in Quality::ALL {
        let span = TransitionSpan::new("tree", quality);
        let _guard = span.enter();
        span.record("fallbacks", 1usize);
    }
}

// =============================================================================
// Metric Recorder Tests
// =============================================================================

#[test]
fn cache_recorders_no_panic() {
    record_cache_lookup(true);
    record_cache_lookup(false);
    record_load_time(Duration::from_millis(12));
    record_cache_usage(1024, 3);
    record_cache_eviction("lru");
}

#[test]
fn quality_recorders_no_panic() {
    record_quality_change(None, Quality::High);
    record_quality_change(Some(Quality::High), Quality::Low);
    record_fallback();
    record_exhausted();
    record_optimization();
}

#[test]
fn perf_recorders_no_panic() {
    record_frame(58.5, 17.1);
    record_frame(0.0, 0.0);
    record_memory(92.0);
    record_issue("low_fps", "critical");
}
