//! CLI tests for the BingMux binary
//!
//! Tests command-line interface functionality: --version, --help, unknown
//! arguments and the `config` subcommands. Every run gets a private HOME and
//! working directory so the developer's own configuration never leaks in.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::str;

use tempfile::TempDir;

/// Run the built binary inside `home` with a scrubbed BingMux environment
fn run_in(home: &Path, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bingmux"));
    cmd.args(args)
        .current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("BINGMUX_CONFIG")
        .env_remove("BINGMUX_SERVER_PORT")
        .env_remove("BINGMUX_SERVER_API_KEY")
        .env_remove("PORT")
        .env_remove("API_KEY")
        .env_remove("RUST_LOG");
    for (key, value) in extra_env {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute bingmux binary")
}

fn stdout(output: &Output) -> &str {
    str::from_utf8(&output.stdout).expect("Invalid UTF-8")
}

fn stderr(output: &Output) -> &str {
    str::from_utf8(&output.stderr).expect("Invalid UTF-8")
}

/// Test that --version flag works and outputs correct version format
#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["--version"], &[]);

    assert!(output.status.success(), "Version command should succeed");
    let text = stdout(&output);
    assert_eq!(text.trim(), format!("bingmux {}", env!("CARGO_PKG_VERSION")));
}

/// Test that -V flag works (short version)
#[test]
fn test_version_flag_short() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["-V"], &[]);

    assert!(output.status.success());
    assert!(stdout(&output).starts_with("bingmux "));
}

/// Test that --help lists commands and environment variables
#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["--help"], &[]);

    assert!(output.status.success(), "Help command should succeed");
    let text = stdout(&output);
    assert!(text.contains("USAGE:"));
    assert!(text.contains("config validate"));
    assert!(text.contains("BINGMUX_SERVER_PORT"));
}

/// Test that unknown options fail with help on stdout
#[test]
fn test_unknown_option() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["--frobnicate"], &[]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown option: --frobnicate"));
    assert!(stdout(&output).contains("USAGE:"));
}

/// Test that `config validate` passes on defaults
#[test]
fn test_config_validate_defaults() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["config", "validate"], &[]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("validation passed"));
    assert!(text.contains("server.api_key"), "missing api key warning: {}", text);
}

/// Test that `config validate` fails on an invalid explicit file
#[test]
fn test_config_validate_reports_errors() {
    let home = TempDir::new().unwrap();
    let config_path = home.path().join("broken.toml");
    fs::write(&config_path, "[upstream]\nconnect_timeout_secs = 0\n").unwrap();
    let config_path = config_path.to_string_lossy().to_string();

    let output =
        run_in(home.path(), &["config", "validate"], &[("BINGMUX_CONFIG", config_path.as_str())]);

    assert!(!output.status.success());
    assert!(stdout(&output).contains("connect_timeout_secs cannot be zero"));
}

/// Test that `config show` never prints the API key
#[test]
fn test_config_show_hides_api_key() {
    let home = TempDir::new().unwrap();
    let output = run_in(
        home.path(),
        &["config", "show"],
        &[("BINGMUX_SERVER_API_KEY", "super-secret"), ("BINGMUX_SERVER_PORT", "4100")],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Port: 4100"));
    assert!(text.contains("API Key: configured"));
    assert!(!text.contains("super-secret"));
}

/// Test that an unknown config subcommand fails
#[test]
fn test_config_unknown_subcommand() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &["config", "reset"], &[]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("bingmux config <init|show|validate>"));
}

/// Test that a broken environment stops the server before binding
#[test]
fn test_invalid_env_fails_startup() {
    let home = TempDir::new().unwrap();
    let output = run_in(home.path(), &[], &[("BINGMUX_STREAMING_MODE", "sometimes")]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid streaming mode"));
}
