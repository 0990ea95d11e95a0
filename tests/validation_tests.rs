//! Configuration validation tests
//!
//! Exercises the validator's error and warning findings on hand-built configurations.

use bingmux::ErrorKind;
use bingmux::config::validation::ConfigValidator;
use bingmux::config::{Config, LogLevel};

/// A configuration that raises no findings
fn quiet_config() -> Config {
    let mut config = Config::default();
    config.server.api_key = Some("test-key".to_string());
    config
}

/// Test that a fully configured setup produces no findings
#[test]
fn test_quiet_config_has_no_findings() {
    let config = quiet_config();
    let report = ConfigValidator::new(&config).report();
    assert!(report.is_valid());
    assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
}

/// Test that validation detects invalid port
#[test]
fn test_validation_invalid_port() {
    let mut config = quiet_config();
    config.server.port = 0;

    let report = ConfigValidator::new(&config).report();
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|e| e.contains("Invalid server port 0")));
}

/// Test that privileged ports only warn
#[test]
fn test_validation_privileged_port_warning() {
    let mut config = quiet_config();
    config.server.port = 80;

    let report = ConfigValidator::new(&config).report();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| w.contains("privileges")));
}

/// Test that malformed upstream addresses are errors
#[test]
fn test_validation_bad_upstream_schemes() {
    let mut config = quiet_config();
    config.upstream.endpoint = "ftp://www.bing.com".to_string();
    config.upstream.chathub_url = "https://sydney.bing.com/sydney/ChatHub".to_string();

    let report = ConfigValidator::new(&config).report();
    assert_eq!(report.errors.len(), 2, "errors: {:?}", report.errors);
    assert!(report.errors.iter().any(|e| e.contains("upstream.endpoint")));
    assert!(report.errors.iter().any(|e| e.contains("upstream.chathub_url")));
}

/// Test that validation detects warnings for plain http and ws
#[test]
fn test_validation_plaintext_warnings() {
    let mut config = quiet_config();
    config.upstream.endpoint = "http://127.0.0.1:8080".to_string();
    config.upstream.chathub_url = "ws://127.0.0.1:8080/chathub".to_string();

    let report = ConfigValidator::new(&config).report();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| w.contains("plain http")));
    assert!(report.warnings.iter().any(|w| w.contains("plain ws")));
}

/// Test that every zero timeout is reported
#[test]
fn test_validation_zero_timeouts() {
    let mut config = quiet_config();
    config.upstream.request_timeout_secs = 0;
    config.upstream.frame_idle_timeout_secs = 0;

    let report = ConfigValidator::new(&config).report();
    assert!(report.errors.contains(&"upstream.request_timeout_secs cannot be zero".to_string()));
    assert!(
        report.errors.contains(&"upstream.frame_idle_timeout_secs cannot be zero".to_string())
    );
    assert!(!report.errors.iter().any(|e| e.contains("connect_timeout_secs")));
}

/// Test that an empty identification string is rejected
#[test]
fn test_validation_empty_user_agent() {
    let mut config = quiet_config();
    config.upstream.user_agent = "  ".to_string();

    let report = ConfigValidator::new(&config).report();
    assert!(report.errors.iter().any(|e| e.contains("user_agent")));
}

/// Test that a tiny context limit only warns
#[test]
fn test_validation_small_context_limit() {
    let mut config = quiet_config();
    config.upstream.context_limit = 100;

    let report = ConfigValidator::new(&config).report();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| w.contains("context limit")));
}

/// Test the security warnings
#[test]
fn test_validation_security_warnings() {
    let mut config = Config::default();
    config.server.log_level = LogLevel::Trace;

    let report = ConfigValidator::new(&config).report();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| w.contains("server.api_key")));
    assert!(report.warnings.iter().any(|w| w.contains("Trace log level")));
}

/// Test that an empty API key is an error rather than open access
#[test]
fn test_validation_empty_api_key() {
    let mut config = quiet_config();
    config.server.api_key = Some(String::new());

    let report = ConfigValidator::new(&config).report();
    assert!(report.errors.iter().any(|e| e.contains("server.api_key")));
}

/// Test that non-numeric classifier status keys are rejected
#[test]
fn test_validation_bad_classifier_override() {
    let mut config = quiet_config();
    config.classifier.status.insert("five hundred".to_string(), ErrorKind::BingForbidden);

    let report = ConfigValidator::new(&config).report();
    assert!(!report.is_valid());
}

/// Test that validate() folds every error into one numbered message
#[test]
fn test_validate_lists_all_errors() {
    let mut config = quiet_config();
    config.server.port = 0;
    config.upstream.connect_timeout_secs = 0;

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("2 error(s)"), "got: {}", message);
    assert!(message.contains("1. "));
    assert!(message.contains("2. "));
}
