//!
//! Configuration loading system for BingMux.
//!
//! This module implements a multi-layered configuration loading system:
//! 1. Environment variables (highest priority)
//! 2. Explicit config file (`BINGMUX_CONFIG`)
//! 3. User config file (~/.config/bingmux/config.toml)
//! 4. System config file (/etc/bingmux/config.toml)
//! 5. Built-in defaults (lowest priority)
//!
//! File layers are merged key by key: a later file only overrides the keys it
//! actually names.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::paths;
use crate::config::{Config, LogLevel, StreamingMode};
use crate::error::{ProxyError, Result};

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

/* --- constants ------------------------------------------------------------------------------- */

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "BINGMUX_CONFIG";

/// Prefix of all recognised environment overrides
const ENV_PREFIX: &str = "BINGMUX_";

/// Legacy variable names still honoured with a deprecation warning
const LEGACY_VARS: [&str; 4] = ["PORT", "API_KEY", "BING_ENDPOINT", "USER_AGENT"];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration loader implementing the Builder pattern.
///
/// Provides a fluent interface for building configuration from multiple sources
/// in the correct precedence order. Each method returns self for chaining.
pub struct ConfigLoader {
    /// Current configuration being built
    config: Config,
    /// Environment variable overrides collected (sorted for deterministic application)
    env_overrides: BTreeMap<String, String>,
    /// Whether defaults have been applied
    defaults_applied: bool,
}

/* --- implementations --------------------------------------------------------------------- */

impl ConfigLoader {
    /// Create a new configuration loader
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bingmux::config::loader::ConfigLoader;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ConfigLoader::new()
    ///     .with_defaults()
    ///     .with_user_config()?
    ///     .with_env_vars()?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self { config: Config::default(), env_overrides: BTreeMap::new(), defaults_applied: false }
    }

    /// Apply built-in default values
    pub fn with_defaults(mut self) -> Self {
        self.config = Config::default();
        self.defaults_applied = true;
        self
    }

    /// Load system-wide configuration file
    ///
    /// If the file doesn't exist, this is not considered an error.
    ///
    /// # Returns
    /// * `Ok(Self)` - System config loaded or skipped (file not found)
    /// * `Err(ProxyError)` - System config exists but failed to load
    pub fn with_system_config(mut self) -> Result<Self> {
        let system_config_path = paths::system_config_file()?;

        if system_config_path.exists() {
            tracing::debug!("Loading system config from: {}", system_config_path.display());
            self.load_config_file(&system_config_path)?;
        } else {
            tracing::debug!("System config not found at: {}", system_config_path.display());
        }

        Ok(self)
    }

    /// Load user configuration file
    ///
    /// If the file doesn't exist, this is not considered an error.
    ///
    /// # Returns
    /// * `Ok(Self)` - User config loaded or skipped (file not found)
    /// * `Err(ProxyError)` - User config exists but failed to load
    pub fn with_user_config(mut self) -> Result<Self> {
        let user_config_path = paths::user_config_file()?;

        if user_config_path.exists() {
            tracing::debug!("Loading user config from: {}", user_config_path.display());
            self.load_config_file(&user_config_path)?;
        } else {
            tracing::debug!("User config not found at: {}", user_config_path.display());
        }

        Ok(self)
    }

    /// Load the file named by `BINGMUX_CONFIG`, if set
    ///
    /// Unlike the implicit layers, a named file that does not exist is an error.
    pub fn with_explicit_config(self) -> Result<Self> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let path = paths::expand_path(raw.trim())?;
                self.with_config_file(path)
            }
            _ => Ok(self),
        }
    }

    /// Load configuration from specific file path
    ///
    /// # Arguments
    /// * `path` - Path to configuration file to load
    ///
    /// # Returns
    /// * `Ok(Self)` - Config loaded successfully
    /// * `Err(ProxyError)` - Failed to load or parse config file
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading custom config from: {}", path.display());
        self.load_config_file(path)?;
        Ok(self)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - BINGMUX_SERVER_PORT, BINGMUX_SERVER_LOG_LEVEL, BINGMUX_SERVER_API_KEY
    /// - BINGMUX_UPSTREAM_ENDPOINT, BINGMUX_UPSTREAM_CHATHUB_URL, BINGMUX_UPSTREAM_USER_AGENT
    /// - BINGMUX_UPSTREAM_REQUEST_TIMEOUT_SECS, BINGMUX_UPSTREAM_CONNECT_TIMEOUT_SECS,
    ///   BINGMUX_UPSTREAM_FRAME_IDLE_TIMEOUT_SECS, BINGMUX_UPSTREAM_CONTEXT_LIMIT
    /// - BINGMUX_STREAMING_MODE
    /// - legacy: PORT, API_KEY, BING_ENDPOINT, USER_AGENT
    ///
    /// # Returns
    /// * `Ok(Self)` - Environment variables applied
    /// * `Err(ProxyError)` - Invalid environment variable values
    pub fn with_env_vars(mut self) -> Result<Self> {
        tracing::debug!("Loading configuration from environment variables");

        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) || LEGACY_VARS.contains(&key.as_str()) {
                self.env_overrides.insert(key, value);
            }
        }

        self.apply_env_overrides()?;

        Ok(self)
    }

    /// Build the final configuration
    ///
    /// Validates the final configuration and returns it.
    ///
    /// # Returns
    /// * `Ok(Config)` - Valid, fully-loaded configuration
    /// * `Err(ProxyError)` - Configuration validation failed
    pub fn build(self) -> Result<Config> {
        let config = self.build_unvalidated()?;
        config.validate()?;

        tracing::info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Build configuration without running validation
    ///
    /// Used by `config show` and `config validate`, which report problems
    /// themselves instead of failing on the first one.
    pub fn build_unvalidated(self) -> Result<Config> {
        if !self.defaults_applied {
            return Err(ProxyError::Config(
                "Configuration loader must call with_defaults() before build()".to_string(),
            ));
        }

        tracing::debug!(
            "Final config: port={}, log_level={:?}, streaming={:?}, endpoint={}",
            self.config.server.port,
            self.config.server.log_level,
            self.config.streaming.mode,
            self.config.upstream.endpoint
        );

        Ok(self.config)
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Load and merge configuration from a TOML file
    fn load_config_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        paths::validate_config_file(path)?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let parse_error = |e: &dyn std::fmt::Display| {
            ProxyError::Config(format!(
                "Failed to parse TOML configuration file '{}': {}\n\
                 \n\
                 Please check the syntax of your configuration file.\n\
                 Common issues:\n\
                 1. Missing quotes around string values\n\
                 2. Invalid TOML syntax\n\
                 3. Incorrect section names or field names\n\
                 \n\
                 Run 'bingmux config validate' for more details.",
                path.display(),
                e
            ))
        };

        let layer: toml::Table = toml::from_str(&contents).map_err(|e| parse_error(&e))?;
        self.merge_layer(layer).map_err(|e| parse_error(&e))?;

        tracing::debug!("Successfully loaded config from: {}", path.display());
        Ok(())
    }

    /// Merge a parsed file layer over the current config
    fn merge_layer(&mut self, layer: toml::Table) -> std::result::Result<(), String> {
        let mut base = match toml::Value::try_from(&self.config).map_err(|e| e.to_string())? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        merge_tables(&mut base, layer);
        self.config = toml::Value::Table(base).try_into().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Apply environment variable overrides to current configuration
    fn apply_env_overrides(&mut self) -> Result<()> {
        for (key, value) in &self.env_overrides {
            let upstream = &mut self.config.upstream;
            match key.as_str() {
                // Server configuration
                "BINGMUX_SERVER_PORT" => {
                    self.config.server.port = parse_env(value, key)?;
                }
                "BINGMUX_SERVER_LOG_LEVEL" => {
                    self.config.server.log_level = LogLevel::parse(value)?;
                }
                "BINGMUX_SERVER_API_KEY" => {
                    self.config.server.api_key = non_empty(value);
                }

                // Upstream configuration
                "BINGMUX_UPSTREAM_ENDPOINT" => upstream.endpoint = value.clone(),
                "BINGMUX_UPSTREAM_CHATHUB_URL" => upstream.chathub_url = value.clone(),
                "BINGMUX_UPSTREAM_USER_AGENT" => upstream.user_agent = value.clone(),
                "BINGMUX_UPSTREAM_REQUEST_TIMEOUT_SECS" => {
                    upstream.request_timeout_secs = parse_env(value, key)?;
                }
                "BINGMUX_UPSTREAM_CONNECT_TIMEOUT_SECS" => {
                    upstream.connect_timeout_secs = parse_env(value, key)?;
                }
                "BINGMUX_UPSTREAM_FRAME_IDLE_TIMEOUT_SECS" => {
                    upstream.frame_idle_timeout_secs = parse_env(value, key)?;
                }
                "BINGMUX_UPSTREAM_CONTEXT_LIMIT" => {
                    upstream.context_limit = parse_env(value, key)?;
                }

                // Streaming configuration
                "BINGMUX_STREAMING_MODE" => {
                    self.config.streaming.mode = StreamingMode::parse(value)?;
                }

                // Consumed by with_explicit_config
                CONFIG_PATH_ENV => {}

                // Legacy environment variables for backward compatibility
                "PORT" => {
                    deprecated(key, "BINGMUX_SERVER_PORT");
                    self.config.server.port = parse_env(value, key)?;
                }
                "API_KEY" => {
                    deprecated(key, "BINGMUX_SERVER_API_KEY");
                    self.config.server.api_key = non_empty(value);
                }
                "BING_ENDPOINT" => {
                    deprecated(key, "BINGMUX_UPSTREAM_ENDPOINT");
                    upstream.endpoint = value.clone();
                }
                "USER_AGENT" => {
                    deprecated(key, "BINGMUX_UPSTREAM_USER_AGENT");
                    upstream.user_agent = value.clone();
                }

                _ => {
                    tracing::debug!("Ignoring unknown environment variable: {}", key);
                }
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/* --- utility functions ------------------------------------------------------------------- */

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Parse a typed value from an environment variable
fn parse_env<T>(value: &str, var_name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ProxyError::Config(format!("Invalid {} value '{}': {}", var_name, value, e))
    })
}

fn deprecated(legacy: &str, replacement: &str) {
    tracing::warn!("{} environment variable is deprecated. Please use {}.", legacy, replacement);
}

/// Treat blank values as unset
fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CLEAN_ENV: [(&str, Option<&str>); 5] = [
        ("PORT", None),
        ("API_KEY", None),
        ("BING_ENDPOINT", None),
        ("USER_AGENT", None),
        ("BINGMUX_CONFIG", None),
    ];

    #[test]
    fn test_config_loader_defaults() {
        let config = ConfigLoader::new()
            .with_defaults()
            .build_unvalidated()
            .expect("Should build with defaults");

        assert_eq!(config.server.port, 3000);
        assert!(matches!(config.server.log_level, LogLevel::Info));
        assert_eq!(config.upstream.endpoint, "https://www.bing.com");
        assert_eq!(config.upstream.context_limit, 32000);
    }

    #[test]
    fn test_build_requires_defaults() {
        assert!(ConfigLoader::new().build_unvalidated().is_err());
    }

    #[test]
    fn test_config_loader_with_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");

        let config_content = r#"
[server]
port = 8080
log_level = "debug"

[upstream]
endpoint = "https://bing.example.test"

[streaming]
mode = "always"
"#;

        fs::write(&config_file, config_content).unwrap();

        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&config_file)
            .expect("Should create loader")
            .build_unvalidated()
            .expect("Should load custom config file");

        assert_eq!(config.server.port, 8080);
        assert!(matches!(config.server.log_level, LogLevel::Debug));
        assert!(matches!(config.streaming.mode, StreamingMode::Always));
        assert_eq!(config.upstream.endpoint, "https://bing.example.test");
        // untouched keys keep their defaults
        assert_eq!(config.upstream.chathub_url, "wss://sydney.bing.com/sydney/ChatHub");
    }

    #[test]
    fn test_layers_merge_per_key() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.toml");
        let second = temp_dir.path().join("second.toml");
        fs::write(&first, "[server]\nport = 7000\nlog_level = \"warn\"\n").unwrap();
        fs::write(&second, "[server]\nport = 7001\n").unwrap();

        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&first)
            .unwrap()
            .with_config_file(&second)
            .unwrap()
            .build_unvalidated()
            .unwrap();

        assert_eq!(config.server.port, 7001);
        assert!(matches!(config.server.log_level, LogLevel::Warn));
    }

    #[test]
    fn test_env_var_overrides() {
        let mut vars: Vec<(&str, Option<&str>)> = CLEAN_ENV.to_vec();
        vars.extend([
            ("BINGMUX_SERVER_PORT", Some("9090")),
            ("BINGMUX_SERVER_LOG_LEVEL", Some("error")),
            ("BINGMUX_STREAMING_MODE", Some("never")),
            ("BINGMUX_UPSTREAM_CONTEXT_LIMIT", Some("500")),
            ("BINGMUX_SERVER_API_KEY", Some("secret")),
        ]);
        temp_env::with_vars(vars, || {
            let config = ConfigLoader::new()
                .with_defaults()
                .with_env_vars()
                .expect("Should apply env vars")
                .build_unvalidated()
                .expect("Should build with env vars");

            assert_eq!(config.server.port, 9090);
            assert!(matches!(config.server.log_level, LogLevel::Error));
            assert!(matches!(config.streaming.mode, StreamingMode::Never));
            assert_eq!(config.upstream.context_limit, 500);
            assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        });
    }

    #[test]
    fn test_legacy_env_vars() {
        temp_env::with_vars(
            [
                ("PORT", Some("4000")),
                ("API_KEY", Some("legacy")),
                ("BING_ENDPOINT", Some("https://legacy.example.test")),
                ("USER_AGENT", Some("legacy-agent")),
            ],
            || {
                let config = ConfigLoader::new()
                    .with_defaults()
                    .with_env_vars()
                    .unwrap()
                    .build_unvalidated()
                    .unwrap();
                assert_eq!(config.server.port, 4000);
                assert_eq!(config.server.api_key.as_deref(), Some("legacy"));
                assert_eq!(config.upstream.endpoint, "https://legacy.example.test");
                assert_eq!(config.upstream.user_agent, "legacy-agent");
            },
        );
    }

    #[test]
    fn test_precedence_order() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[server]\nport = 7070\n").unwrap();

        temp_env::with_vars([("BINGMUX_SERVER_PORT", Some("8080")), ("PORT", None)], || {
            let config = ConfigLoader::new()
                .with_defaults()
                .with_config_file(&config_file)
                .expect("Should create loader")
                .with_env_vars()
                .expect("Should apply env vars")
                .build_unvalidated()
                .expect("Should build with precedence");

            assert_eq!(config.server.port, 8080);
        });
    }

    #[test]
    fn test_invalid_env_value() {
        temp_env::with_vars([("BINGMUX_UPSTREAM_CONNECT_TIMEOUT_SECS", Some("soon"))], || {
            let result = ConfigLoader::new().with_defaults().with_env_vars();
            let err = result.err().expect("non-numeric timeout must fail");
            assert!(err.to_string().contains("BINGMUX_UPSTREAM_CONNECT_TIMEOUT_SECS"));
        });
    }

    #[test]
    fn test_invalid_toml_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[server\nport = 8080\n").unwrap();

        let result = ConfigLoader::new()
            .with_defaults()
            .with_config_file(&config_file)
            .and_then(|loader| loader.build_unvalidated());

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("Failed to parse TOML"));
    }

    #[test]
    fn test_wrong_type_in_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[streaming]\nmode = \"sometimes\"\n").unwrap();

        let result = ConfigLoader::new().with_defaults().with_config_file(&config_file);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: toml::Table = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Table = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        merge_tables(&mut base, overlay);
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }
}
