//! Settings resolution across CLI, environment, and settings file.

use serial_test::serial;
use std::time::Duration;
use tempfile::tempdir;
use toolgraph_state::{Settings, SettingsLayer, DEFAULT_BASE_URL};
use toolgraph_test_utils::set_env_var;

const ALL_VARS: [&str; 9] = [
    "TOOLGRAPH_BASE_URL",
    "TOOLGRAPH_API_PREFIX",
    "TOOLGRAPH_TIMEOUT_MS",
    "TOOLGRAPH_RETRY_ATTEMPTS",
    "TOOLGRAPH_CACHE_TTL_SECS",
    "TOOLGRAPH_NAMESPACE",
    "TOOLGRAPH_GROUP",
    "TOOLGRAPH_SCENARIO_DEADLINE_SECS",
    "TOOLGRAPH_CONFIG",
];

fn clear_env() -> Vec<toolgraph_test_utils::EnvVarGuard> {
    ALL_VARS.into_iter().map(|k| set_env_var(k, None)).collect()
}

#[test]
#[serial]
fn given_nothing_configured_when_resolving_then_defaults_apply() {
    // Given an empty environment and a settings path that does not exist
    let _env = clear_env();
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("absent.json");
    let _cfg = set_env_var("TOOLGRAPH_CONFIG", Some(missing.to_str().unwrap()));

    // When
    let settings = Settings::resolve(SettingsLayer::default()).unwrap();

    // Then
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.timeout, Duration::from_millis(10_000));
}

#[test]
#[serial]
fn given_file_env_and_cli_when_resolving_then_cli_beats_env_beats_file() {
    // Given a settings file
    let _env = clear_env();
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"baseUrl": "http://file:1", "timeoutMs": 500, "group": "file-group", "retryAttempts": 7}"#,
    )
    .unwrap();
    let _cfg = set_env_var("TOOLGRAPH_CONFIG", Some(path.to_str().unwrap()));

    // And environment overrides for two of its fields
    let _url = set_env_var("TOOLGRAPH_BASE_URL", Some("http://env:2"));
    let _timeout = set_env_var("TOOLGRAPH_TIMEOUT_MS", Some("750"));

    // When a CLI flag overrides one of those again
    let cli = SettingsLayer {
        base_url: Some("http://cli:3".into()),
        ..Default::default()
    };
    let settings = Settings::resolve(cli).unwrap();

    // Then
    assert_eq!(settings.base_url, "http://cli:3");
    assert_eq!(settings.timeout, Duration::from_millis(750));
    assert_eq!(settings.retry_attempts, 7);
    assert_eq!(settings.group, "file-group");
    assert_eq!(settings.namespace, "integration-test-namespace");
}

#[test]
#[serial]
fn given_unparsable_env_number_when_resolving_then_error_names_variable() {
    let _env = clear_env();
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("absent.json");
    let _cfg = set_env_var("TOOLGRAPH_CONFIG", Some(missing.to_str().unwrap()));
    let _ttl = set_env_var("TOOLGRAPH_CACHE_TTL_SECS", Some("thirty"));

    let err = Settings::resolve(SettingsLayer::default()).unwrap_err();

    assert!(format!("{err:#}").contains("TOOLGRAPH_CACHE_TTL_SECS"));
}

#[test]
#[serial]
fn given_malformed_settings_file_when_resolving_then_error_names_path() {
    let _env = clear_env();
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("settings.json");
    std::fs::write(&path, "{not json").unwrap();
    let _cfg = set_env_var("TOOLGRAPH_CONFIG", Some(path.to_str().unwrap()));

    let err = Settings::resolve(SettingsLayer::default()).unwrap_err();

    assert!(format!("{err:#}").contains("settings.json"));
}
