//! Configuration module tests
//!
//! Tests for layered configuration loading: defaults, TOML files, the explicit
//! `BINGMUX_CONFIG` file and environment overrides.
//!
//! Uses temp-env to safely manage environment variables during tests, automatically
//! restoring them after each test completes.

use std::fs;

use bingmux::config::loader::{CONFIG_PATH_ENV, ConfigLoader};
use bingmux::config::{Config, LogLevel, StreamingMode};
use bingmux::{ErrorKind, ProxyError};
use tempfile::TempDir;
use temp_env::with_vars;

/// Variables that would leak into a loader run from the developer's shell
fn clean_env() -> Vec<(&'static str, Option<&'static str>)> {
    vec![
        ("PORT", None),
        ("API_KEY", None),
        ("BING_ENDPOINT", None),
        ("USER_AGENT", None),
        (CONFIG_PATH_ENV, None),
        ("BINGMUX_SERVER_PORT", None),
        ("BINGMUX_SERVER_API_KEY", None),
        ("BINGMUX_STREAMING_MODE", None),
    ]
}

/// Test that the built-in defaults describe the public Bing endpoints
#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.log_level, LogLevel::Info);
    assert!(config.server.api_key.is_none());
    assert_eq!(config.upstream.endpoint, "https://www.bing.com");
    assert_eq!(config.upstream.chathub_url, "wss://sydney.bing.com/sydney/ChatHub");
    assert!(config.upstream.user_agent.contains("Edg/"));
    assert_eq!(config.upstream.context_limit, 32000);
    assert_eq!(config.streaming.mode, StreamingMode::Auto);
}

/// Test that the defaults pass validation
#[test]
fn test_defaults_are_valid() {
    assert!(Config::default().validate().is_ok());
}

/// Test that a config file overrides only the keys it names
#[test]
fn test_file_overrides_named_keys() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
api_key = "file-key"

[upstream]
context_limit = 4000
frame_idle_timeout_secs = 30
"#,
    )
    .unwrap();

    let config =
        ConfigLoader::new().with_defaults().with_config_file(&path).unwrap().build().unwrap();

    assert_eq!(config.server.api_key.as_deref(), Some("file-key"));
    assert_eq!(config.upstream.context_limit, 4000);
    assert_eq!(config.upstream.frame_idle_timeout_secs, 30);
    assert_eq!(config.server.port, 3000);
    let defaults = Config::default();
    assert_eq!(config.upstream.connect_timeout_secs, defaults.upstream.connect_timeout_secs);
}

/// Test that the explicit file named by BINGMUX_CONFIG is loaded
#[test]
fn test_explicit_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("explicit.toml");
    fs::write(&path, "[server]\nport = 4242\n").unwrap();
    let path_str = path.to_string_lossy().to_string();

    let mut vars: Vec<(&str, Option<&str>)> = clean_env();
    vars.retain(|(name, _)| *name != CONFIG_PATH_ENV);
    vars.push((CONFIG_PATH_ENV, Some(path_str.as_str())));

    with_vars(vars, || {
        let config = ConfigLoader::new()
            .with_defaults()
            .with_explicit_config()
            .unwrap()
            .with_env_vars()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.server.port, 4242);
    });
}

/// Test that a missing explicit file is an error, unlike the implicit layers
#[test]
fn test_missing_explicit_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    let missing_str = missing.to_string_lossy().to_string();

    with_vars([(CONFIG_PATH_ENV, Some(missing_str.as_str()))], || {
        let result = ConfigLoader::new().with_defaults().with_explicit_config();
        let err = result.err().expect("a named file that does not exist must fail");
        assert!(matches!(err, ProxyError::Config(_)));
        assert!(err.to_string().contains("does not exist"));
    });
}

/// Test that environment variables win over file values
#[test]
fn test_env_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[server]\nport = 7000\n\n[streaming]\nmode = \"never\"\n").unwrap();

    let mut vars = clean_env();
    vars.retain(|(name, _)| *name != "BINGMUX_STREAMING_MODE");
    vars.push(("BINGMUX_STREAMING_MODE", Some("always")));
    vars.push(("BINGMUX_UPSTREAM_CHATHUB_URL", Some("ws://127.0.0.1:9/chathub")));

    with_vars(vars, || {
        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&path)
            .unwrap()
            .with_env_vars()
            .unwrap()
            .build_unvalidated()
            .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.streaming.mode, StreamingMode::Always);
        assert_eq!(config.upstream.chathub_url, "ws://127.0.0.1:9/chathub");
    });
}

/// Test that a blank API key from the environment leaves authentication off
#[test]
fn test_blank_api_key_is_unset() {
    let mut vars = clean_env();
    vars.retain(|(name, _)| *name != "BINGMUX_SERVER_API_KEY");
    vars.push(("BINGMUX_SERVER_API_KEY", Some("   ")));

    with_vars(vars, || {
        let config =
            ConfigLoader::new().with_defaults().with_env_vars().unwrap().build().unwrap();
        assert!(config.server.api_key.is_none());
    });
}

/// Test that an invalid port fails the build
#[test]
fn test_invalid_port_fails_build() {
    let mut vars = clean_env();
    vars.retain(|(name, _)| *name != "BINGMUX_SERVER_PORT");
    vars.push(("BINGMUX_SERVER_PORT", Some("0")));

    with_vars(vars, || {
        let result = ConfigLoader::new().with_defaults().with_env_vars().unwrap().build();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Invalid server port 0"), "got: {}", message);
    });
}

/// Test that a port outside the u16 range is rejected while parsing
#[test]
fn test_port_out_of_range() {
    let mut vars = clean_env();
    vars.retain(|(name, _)| *name != "BINGMUX_SERVER_PORT");
    vars.push(("BINGMUX_SERVER_PORT", Some("70000")));

    with_vars(vars, || {
        let result = ConfigLoader::new().with_defaults().with_env_vars();
        assert!(matches!(result, Err(ProxyError::Config(_))));
    });
}

/// Test that unknown BINGMUX_ variables are ignored
#[test]
fn test_unknown_env_var_is_ignored() {
    with_vars([("BINGMUX_SOMETHING_ELSE", Some("1"))], || {
        let result = ConfigLoader::new().with_defaults().with_env_vars();
        assert!(result.is_ok());
    });
}

/// Test that invalid log levels and streaming modes are rejected
#[test]
fn test_invalid_enum_values() {
    with_vars([("BINGMUX_SERVER_LOG_LEVEL", Some("loud"))], || {
        assert!(ConfigLoader::new().with_defaults().with_env_vars().is_err());
    });
    with_vars([("BINGMUX_STREAMING_MODE", Some("sometimes"))], || {
        assert!(ConfigLoader::new().with_defaults().with_env_vars().is_err());
    });
}

/// Test that classifier overrides in a file reach the configuration
#[test]
fn test_classifier_overrides_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[classifier.codes]\n\"Throttled\" = \"BING_THROTTLE_LIMIT\"\n").unwrap();

    let config =
        ConfigLoader::new().with_defaults().with_config_file(&path).unwrap().build().unwrap();

    assert_eq!(config.classifier.codes.get("Throttled"), Some(&ErrorKind::BingThrottleLimit));
}

/// Test that an unknown error kind in the classifier section is a parse error
#[test]
fn test_unknown_classifier_kind_in_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[classifier.status]\n\"503\" = \"NOT_A_KIND\"\n").unwrap();

    let result = ConfigLoader::new().with_defaults().with_config_file(&path);
    assert!(result.is_err());
}
