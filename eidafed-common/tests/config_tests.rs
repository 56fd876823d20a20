//! Tests for bootstrap configuration file loading

use eidafed_common::config::{FederationSettings, LoggingConfig, TomlConfig};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_write_then_load_preserves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        host: Some("0.0.0.0".to_string()),
        port: Some(18080),
        routing_url: None,
        federation: FederationSettings {
            workers: Some(3),
            leg_timeout_ms: Some(2500),
            ..Default::default()
        },
        logging: LoggingConfig {
            level: Some("debug".to_string()),
            file: Some(PathBuf::from("/var/log/eidafed/ops.log")),
        },
    };

    config.write(&path).unwrap();
    assert!(path.exists(), "Parent directories should be created");

    let loaded = TomlConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let result = TomlConfig::load_or_default(Some(&missing));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Config file not found"));
}

#[test]
fn test_malformed_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let err = TomlConfig::load(&path).unwrap_err().to_string();
    assert!(err.starts_with("Configuration error: Invalid config file"));
    assert!(err.contains("bad.toml"));
}

#[test]
fn test_partial_file_leaves_other_settings_unset() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[federation]\nbundle_by_year = true\n").unwrap();

    let config = TomlConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(config.federation.bundle_by_year, Some(true));
    assert_eq!(config.federation.workers, None);
    assert_eq!(config.port, None);
    assert_eq!(config.logging, LoggingConfig::default());
}
