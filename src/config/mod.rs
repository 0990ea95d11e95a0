//!
//! Configuration management for BingMux.
//!
//! This module provides a layered configuration system using:
//! - Platform-native configuration directories (XDG on Linux, standard paths on macOS/Windows)
//! - TOML format for human-readable configuration files
//! - Multi-layered configuration hierarchy
//!   (env vars > explicit file > user config > system config > defaults)
//!
//! Sub-modules:
//! - `loader.rs` - Configuration loading logic
//! - `paths.rs` - Platform-native path resolution
//! - `validation.rs` - Configuration validation
//! - `cli.rs` - CLI configuration commands
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cli;
pub mod loader;
pub mod paths;
pub mod validation;

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::ErrorKind;
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Main application configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream Bing endpoints and identification
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Streaming behavior configuration
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Error classification overrides
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

///
/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application logging level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Bearer credential callers must present; open access when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

///
/// Upstream service configuration.
///
/// The bridge talks to two upstream surfaces: the HTTP site (probe and
/// conversation create) and the duplex ChatHub endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base address of the HTTP site, without trailing slash
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Address of the duplex streaming endpoint
    #[serde(default = "default_chathub_url")]
    pub chathub_url: String,
    /// Outbound identification string sent as User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Timeout for probe and conversation create requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout for opening the duplex connection (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between inbound frames (seconds)
    #[serde(default = "default_frame_idle_timeout")]
    pub frame_idle_timeout_secs: u64,
    /// Maximum length (characters) of the condensed prior-context block
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

///
/// Streaming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Streaming mode selection
    #[serde(default = "default_streaming_mode")]
    pub mode: StreamingMode,
}

///
/// Streaming mode configuration.
///
/// Controls whether the request's `stream` flag is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Follow the request's `stream` flag
    Auto,
    /// Always answer with a single completion
    Never,
    /// Always stream
    Always,
}

///
/// Error classifier overrides.
///
/// Keys of `status` are HTTP status codes as strings (TOML table keys),
/// keys of `codes` are upstream result codes (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub status: HashMap<String, ErrorKind>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub codes: HashMap<String, ErrorKind>,
}

///
/// Logging level enumeration.
///
/// Defines available log levels compatible with tracing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/* --- defaults -------------------------------------------------------------------------------- */

/** bound on the condensed prior-message context, in characters */
pub const DEFAULT_CONTEXT_LIMIT: usize = 32000;

/// Default HTTP port
fn default_port() -> u16 {
    3000
}

/// Default logging level
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Default upstream site
fn default_endpoint() -> String {
    "https://www.bing.com".to_string()
}

/// Default duplex endpoint
fn default_chathub_url() -> String {
    "wss://sydney.bing.com/sydney/ChatHub".to_string()
}

/// Default outbound identification (desktop Edge)
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.50"
        .to_string()
}

/// Default HTTP request timeout (30 seconds)
fn default_request_timeout() -> u64 {
    30
}

/// Default duplex connect timeout (15 seconds)
fn default_connect_timeout() -> u64 {
    15
}

/// Default frame idle timeout (2 minutes)
fn default_frame_idle_timeout() -> u64 {
    120
}

/// Default prior-context limit (characters)
fn default_context_limit() -> usize {
    DEFAULT_CONTEXT_LIMIT
}

/// Default streaming mode
fn default_streaming_mode() -> StreamingMode {
    StreamingMode::Auto
}

/* --- implementations --------------------------------------------------------------------- */

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), log_level: default_log_level(), api_key: None }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chathub_url: default_chathub_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            frame_idle_timeout_secs: default_frame_idle_timeout(),
            context_limit: default_context_limit(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { mode: default_streaming_mode() }
    }
}

impl UpstreamConfig {
    /// HTTP request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Duplex connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Frame idle timeout as a Duration
    pub fn frame_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_idle_timeout_secs)
    }

    /// Upstream base address without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

impl Config {
    /// Load configuration from the standard hierarchy:
    /// 1. Environment variables (highest priority)
    /// 2. Explicit config file named by `BINGMUX_CONFIG`
    /// 3. User config file (~/.config/bingmux/config.toml)
    /// 4. System config file (/etc/bingmux/config.toml)
    /// 5. Built-in defaults (lowest priority)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(ProxyError)` - Configuration loading or validation failed
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bingmux::config::Config;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = Config::load()?;
    /// println!("Server will run on port {}", config.server.port);
    /// # Ok(())
    /// # }
    /// ```
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        loader::ConfigLoader::new()
            .with_defaults()
            .with_system_config()?
            .with_user_config()?
            .with_explicit_config()?
            .with_env_vars()?
            .build()
    }

    /// Validate the current configuration
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid (warnings are logged)
    /// * `Err(ProxyError)` - Configuration validation failed with details
    pub fn validate(&self) -> Result<()> {
        validation::ConfigValidator::new(self).validate()
    }

    /// Get configuration file example as TOML string
    ///
    /// Returns a documented example configuration file that users
    /// can use as a starting point for their own configuration.
    pub fn example_toml() -> &'static str {
        r#"# BingMux Configuration
# This file should be placed at:
#   Linux/Unix: ~/.config/bingmux/config.toml
#   macOS: ~/Library/Application Support/com.SkyCorp.bingmux/config.toml
#   Windows: %APPDATA%/SkyCorp/bingmux/config/config.toml

[server]
# HTTP server port (default: 3000)
port = 3000

# Logging level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Bearer credential required from callers (default: unset, open access)
# api_key = "change-me"

[upstream]
# Upstream site used for the session probe and conversation create
endpoint = "https://www.bing.com"

# Duplex streaming endpoint
chathub_url = "wss://sydney.bing.com/sydney/ChatHub"

# Outbound identification string
# user_agent = "Mozilla/5.0 ..."

# Timeouts in seconds
request_timeout_secs = 30
connect_timeout_secs = 15
frame_idle_timeout_secs = 120

# Maximum characters of prior conversation forwarded as context
context_limit = 32000

[streaming]
# Streaming mode: auto, never, always (default: auto)
# - auto: follow the request's "stream" flag
# - never: always answer with one completion
# - always: always stream
mode = "auto"

# Error classification overrides (optional)
# [classifier.status]
# "503" = "BING_THROTTLE_LIMIT"
#
# [classifier.codes]
# "CaptchaChallenge" = "BING_CAPTCHA"
"#
    }
}

impl LogLevel {
    /// Directive string for an `EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ProxyError::Config(format!(
                "Invalid log level '{}'. Valid levels are: trace, debug, info, warn, error",
                s
            ))),
        }
    }
}

impl StreamingMode {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(StreamingMode::Auto),
            "never" | "false" | "no" => Ok(StreamingMode::Never),
            "always" | "true" | "yes" => Ok(StreamingMode::Always),
            _ => Err(ProxyError::Config(format!(
                "Invalid streaming mode '{}'. Valid modes are: auto, never, always",
                s
            ))),
        }
    }

    /// Decide whether a request should be streamed
    ///
    /// # Arguments
    /// * `requested` - the request's `stream` flag, if any
    pub fn should_stream(&self, requested: Option<bool>) -> bool {
        match self {
            StreamingMode::Auto => requested.unwrap_or(false),
            StreamingMode::Never => false,
            StreamingMode::Always => true,
        }
    }
}
