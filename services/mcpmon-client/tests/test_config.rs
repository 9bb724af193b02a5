//! Configuration loading tests

use std::io::Write;

use mcpmon_client::{load_config, ClientError, Config, ReconnectConfig};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "http://localhost:3000");
    assert_eq!(config.api.request_timeout_seconds, 30);
    assert_eq!(config.realtime.connection_timeout_seconds, 10);
    assert!(config.realtime.reconnect.enabled);
    assert_eq!(config.realtime.reconnect.interval_ms, 3000);
    assert_eq!(config.realtime.reconnect.max_attempts, 10);
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"{
            "api": {
                "base_url": "https://mcpmon.example.com/api",
                "request_timeout_seconds": 15
            },
            "realtime": {
                "connection_timeout_seconds": 5,
                "reconnect": {
                    "enabled": false,
                    "interval_ms": 1000,
                    "max_attempts": 3
                }
            }
        }"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.api.base_url, "https://mcpmon.example.com/api");
    assert_eq!(config.api.request_timeout_seconds, 15);
    assert_eq!(config.realtime.connection_timeout_seconds, 5);
    assert_eq!(
        config.realtime.reconnect,
        ReconnectConfig {
            enabled: false,
            interval_ms: 1000,
            max_attempts: 3,
        }
    );
}

#[test]
fn test_partial_config_fills_defaults() {
    let file = write_config(r#"{"realtime": {"reconnect": {"max_attempts": 2}}}"#);

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.api.base_url, "http://localhost:3000");
    assert!(config.realtime.reconnect.enabled);
    assert_eq!(config.realtime.reconnect.interval_ms, 3000);
    assert_eq!(config.realtime.reconnect.max_attempts, 2);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
}

#[test]
fn test_invalid_json_is_json_error() {
    let file = write_config("{ not json");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ClientError::Json(_)));
}

#[test]
fn test_invalid_base_url_is_config_error() {
    let file = write_config(r#"{"api": {"base_url": "mcpmon.example.com"}}"#);
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)), "{err:?}");
}
