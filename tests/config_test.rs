//! Integration tests for configuration validation and device seeding.
//!
//! Environment overrides are covered by the unit tests in `config.rs`;
//! nothing here touches process environment.

use std::sync::Arc;
use std::time::Duration;

use lod_core::quality::{FnLoader, NullDisplay};
use lod_core::{
    AssetLoader, ConfigError, DeviceCapabilities, DeviceTier, LoadError, LodConfig, LodSystem,
};

type Mesh = Arc<Vec<u8>>;

fn loader() -> Arc<dyn AssetLoader<Mesh>> {
    Arc::new(FnLoader::<_, Mesh>::new(|_locator: String| async {
        Ok::<Mesh, LoadError>(Arc::new(vec![0u8; 16]))
    }))
}

#[test]
fn test_default_config_is_valid() {
    assert!(LodConfig::default().validate().is_ok());
}

#[test]
fn test_every_device_tier_yields_valid_config() {
    for tier in [DeviceTier::Low, DeviceTier::Medium, DeviceTier::High] {
        let device = DeviceCapabilities::for_tier(tier);
        let config = LodConfig::from_device(&device);
        assert!(config.validate().is_ok(), "{tier:?}");
        assert_eq!(config.cache.max_entries, device.recommended.max_models);
        assert_eq!(config.cache.max_size, device.recommended.cache_size_bytes);
        let [near, medium, far] = device.recommended.lod_distances;
        let thresholds = config.manager.default_thresholds;
        assert_eq!((thresholds.near(), thresholds.medium(), thresholds.far()), (near, medium, far));
    }
}

#[test]
fn test_device_tier_parse() {
    assert_eq!(DeviceTier::parse("LOW"), Some(DeviceTier::Low));
    assert_eq!(DeviceTier::parse(" medium "), Some(DeviceTier::Medium));
    assert_eq!(DeviceTier::parse("ultra"), None);
}

#[test]
fn test_config_error_lists_violations() {
    let mut config = LodConfig::default();
    config.observer.target_fps = 0.0;
    config.manager.memory_cleanup_fraction = 1.5;

    let violations = config.validate().unwrap_err();
    assert_eq!(violations.len(), 2);

    let message = ConfigError::Invalid(violations).to_string();
    assert!(message.starts_with("Invalid configuration: "));
    assert!(message.contains("observer.target_fps: must be a positive number"));
    assert!(message.contains("manager.memory_cleanup_fraction"));
}

#[test]
fn test_debounce_above_one_hour_is_rejected() {
    let mut config = LodConfig::default();
    config.manager.optimization_debounce = Duration::from_secs(u64::MAX);

    let violations = config.validate().unwrap_err();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field, "manager.optimization_debounce");
}

#[test]
fn test_system_rejects_invalid_config() {
    let mut config = LodConfig::default();
    config.cache.max_entries = 0;

    let result = LodSystem::new(config, loader(), Arc::new(NullDisplay));
    match result {
        Err(ConfigError::Invalid(violations)) => {
            assert_eq!(violations[0].field, "cache.max_entries");
        }
        Ok(_) => panic!("invalid config accepted"),
    }
}

#[test]
fn test_effective_config_serializes() {
    let mut config = LodConfig::default();
    config.manager.idle_unload_after = Some(Duration::from_secs(90));

    let json = serde_json::to_value(config.effective()).unwrap();
    assert_eq!(json["target_fps"], 60.0);
    assert_eq!(json["lod_distances"], serde_json::json!([10.0, 50.0, 100.0]));
    assert_eq!(json["cache_max_entries"], 100);
    assert_eq!(json["optimization_debounce_ms"], 1000);
    assert_eq!(json["idle_unload_after_secs"], 90);
}
