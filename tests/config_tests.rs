// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use fieldcam::Config;
use fieldcam::backends::camera::CameraPosition;
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.camera_position, CameraPosition::Back);
    assert_eq!(
        config.location_timeout(),
        Duration::from_secs(10),
        "Location lookups should wait 10 seconds by default"
    );
    assert!(config.database_path.is_none());
    assert!(
        config.database_path().ends_with("fieldcam/documents.db"),
        "Database should live in the fieldcam data directory"
    );
}

#[test]
fn test_session_config_uses_fixed_quality() {
    let config = Config {
        jpeg_quality: 0,
        ..Config::default()
    };
    let session = config.session_config();
    assert_eq!(session.output.jpeg_quality, 1, "Quality is clamped to 1-100");
    assert_eq!(session.output.width, config.capture_width);
}

#[test]
fn test_config_created_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldcam").join("config.json");

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config, Config::default());
    assert!(path.exists(), "Default config should be written on first load");
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let config = Config {
        database_path: Some(dir.path().join("evidence.db")),
        jpeg_quality: 75,
        camera_position: CameraPosition::Front,
        location_timeout_ms: 2500,
        log_level: "debug".to_string(),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "jpeg_quality": 60 }"#).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.jpeg_quality, 60);
    assert_eq!(loaded.capture_width, Config::default().capture_width);
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_from(&path).is_err());
}
