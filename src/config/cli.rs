//!
//! CLI configuration commands for BingMux.
//!
//! - `config init` - Write the example configuration to the user config path
//! - `config show` - Display the effective configuration
//! - `config validate` - Validate the effective configuration
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::loader::{CONFIG_PATH_ENV, ConfigLoader};
use crate::config::paths;
use crate::config::validation::ConfigValidator;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use std::fs;
use std::path::Path;

/* --- types ----------------------------------------------------------------------------------- */

///
/// CLI configuration command handler.
pub struct ConfigCli;

/* --- implementations --------------------------------------------------------------------- */

impl ConfigCli {
    /// Handle the `config init` command
    ///
    /// # Arguments
    /// * `force` - overwrite an existing user configuration file
    ///
    /// # Returns
    /// * `Ok(())` - Configuration written (or left untouched when it already exists)
    /// * `Err(ProxyError)` - Configuration file could not be written
    pub fn init(force: bool) -> Result<()> {
        paths::ensure_user_config_dir()?;
        let config_file = paths::user_config_file()?;

        if Self::write_example(&config_file, force)? {
            println!("✅ Example configuration written to: {}", config_file.display());
            println!("Edit it, then run 'bingmux config validate'.");
        } else {
            println!("⚠️  Configuration file already exists at:");
            println!("   {}", config_file.display());
            println!("Use 'bingmux config init --force' to overwrite it.");
        }

        Ok(())
    }

    /// Handle the `config show` command
    ///
    /// Displays the effective configuration after merging all sources. The
    /// API key is never printed.
    pub fn show() -> Result<()> {
        let config = Self::load_unvalidated()?;
        print!("{}", Self::render(&config));

        println!();
        println!("Configuration Sources:");
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            println!("  {} ({}): explicit", explicit, CONFIG_PATH_ENV);
        }
        for path in paths::config_file_paths() {
            let status = if path.exists() { "exists" } else { "not found" };
            println!("  {}: {}", path.display(), status);
        }

        Ok(())
    }

    /// Handle the `config validate` command
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid (warnings may have been printed)
    /// * `Err(ProxyError)` - Loading or validation failed
    pub fn validate() -> Result<()> {
        println!("🔍 Validating BingMux Configuration");
        println!();

        let config = Self::load_unvalidated()?;
        let report = ConfigValidator::new(&config).report();

        for warning in &report.warnings {
            println!("⚠️  {}", warning);
        }
        for error in &report.errors {
            println!("❌ {}", error);
        }

        if report.is_valid() {
            println!();
            println!("🎉 Configuration validation passed!");
            Ok(())
        } else {
            Err(ProxyError::Config(format!(
                "Configuration validation failed with {} error(s)",
                report.errors.len()
            )))
        }
    }

    /// Write the example configuration to `path`
    ///
    /// # Returns
    /// * `Ok(true)` - file written
    /// * `Ok(false)` - file exists and `force` was not given
    pub fn write_example(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }

        fs::write(path, Config::example_toml()).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to write configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(true)
    }

    /// Human-readable summary of a configuration
    pub fn render(config: &Config) -> String {
        let api_key = if config.server.api_key.is_some() { "configured" } else { "not set" };
        let mut out = String::new();

        out.push_str("Server Configuration:\n");
        out.push_str(&format!("  Port: {}\n", config.server.port));
        out.push_str(&format!("  Log Level: {:?}\n", config.server.log_level));
        out.push_str(&format!("  API Key: {}\n", api_key));
        out.push('\n');

        let upstream = &config.upstream;
        out.push_str("Upstream Configuration:\n");
        out.push_str(&format!("  Endpoint: {}\n", upstream.endpoint));
        out.push_str(&format!("  ChatHub URL: {}\n", upstream.chathub_url));
        out.push_str(&format!("  User Agent: {}\n", upstream.user_agent));
        out.push_str(&format!(
            "  Timeouts: request {}s, connect {}s, frame idle {}s\n",
            upstream.request_timeout_secs,
            upstream.connect_timeout_secs,
            upstream.frame_idle_timeout_secs
        ));
        out.push_str(&format!("  Context Limit: {} chars\n", upstream.context_limit));
        out.push('\n');

        out.push_str("Streaming Configuration:\n");
        out.push_str(&format!("  Mode: {:?}\n", config.streaming.mode));

        let overrides = config.classifier.status.len() + config.classifier.codes.len();
        if overrides > 0 {
            out.push('\n');
            out.push_str(&format!("Classifier Overrides: {}\n", overrides));
        }

        out
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn load_unvalidated() -> Result<Config> {
        let _ = dotenvy::dotenv();
        ConfigLoader::new()
            .with_defaults()
            .with_system_config()?
            .with_user_config()?
            .with_explicit_config()?
            .with_env_vars()?
            .build_unvalidated()
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_example_respects_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        assert!(ConfigCli::write_example(&path, false).unwrap());
        fs::write(&path, "# mine\n").unwrap();
        assert!(!ConfigCli::write_example(&path, false).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");

        assert!(ConfigCli::write_example(&path, true).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), Config::example_toml());
    }

    #[test]
    fn test_render_hides_api_key() {
        let mut config = Config::default();
        config.server.api_key = Some("super-secret".to_string());
        let rendered = ConfigCli::render(&config);
        assert!(rendered.contains("API Key: configured"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("wss://sydney.bing.com/sydney/ChatHub"));
    }
}
