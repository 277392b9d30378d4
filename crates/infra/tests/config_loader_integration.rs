//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of layering files and environment.

use std::collections::HashMap;
use std::time::Duration;

use fieldlink_domain::config::LogFormat;
use fieldlink_infra::config::{self, ConfigLoader};
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    let vars: HashMap<String, String> =
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key| vars.get(key).cloned()
}

/// Validates file and environment layering.
///
/// Assertions:
/// - Ensures file values replace defaults.
/// - Ensures environment values replace file values.
/// - Ensures untouched sections keep their defaults.
#[test]
fn test_environment_overrides_toml_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("fieldlink.toml");
    std::fs::write(
        &path,
        r#"
[api]
base_url = "https://staging.example.com"
refresh_path = "/auth/refresh"

[queue]
capacity = 50
default_ttl = 7200

[database]
path = "/var/lib/fieldlink/queue.db"
"#,
    )
    .expect("Failed to write config");

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env(env(&[
            ("FIELDLINK_API_BASE_URL", "https://api.example.com"),
            ("FIELDLINK_LOG_FORMAT", "json"),
        ]))
        .load()
        .expect("config should load");

    assert_eq!(config.api.base_url, "https://api.example.com");
    assert_eq!(config.api.refresh_path, "/auth/refresh");
    assert_eq!(config.queue.capacity, 50);
    assert_eq!(config.queue.default_ttl, Duration::from_secs(7200));
    assert_eq!(config.database.path, "/var/lib/fieldlink/queue.db");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.retry.max_retries, 3);
}

#[test]
fn test_config_path_from_environment_json() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"retry": {"max_retries": 6, "base_delay": 200}}"#)
        .expect("Failed to write config");
    let path_str = path.to_string_lossy().into_owned();

    let config = ConfigLoader::new()
        .with_env(env(&[("FIELDLINK_CONFIG", path_str.as_str())]))
        .load()
        .expect("config should load");

    assert_eq!(config.retry.max_retries, 6);
    assert_eq!(config.retry.base_delay, Duration::from_millis(200));
}

#[test]
fn test_invalid_layered_config_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("fieldlink.toml");
    std::fs::write(&path, "[queue]\ncapacity = 5\n").expect("Failed to write config");

    let err = ConfigLoader::new()
        .with_file(&path)
        .with_env(env(&[("FIELDLINK_QUEUE_CAPACITY", "0")]))
        .load()
        .expect_err("capacity 0 should fail validation");

    assert!(err.to_string().contains("queue.capacity"), "{err}");
}

#[test]
fn test_load_from_file_reports_missing_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let err = config::load_from_file(&dir.path().join("absent.toml")).unwrap_err();

    assert!(err.to_string().contains("not found"), "{err}");
}
