//!
//! Configuration validation for BingMux.
//!
//! Checks network settings, upstream addresses, timeouts and security-relevant
//! options. Problems that make the bridge unusable are errors; questionable but
//! workable settings are warnings.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::classifier::ErrorClassifier;
use crate::config::{Config, LogLevel};
use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------- */

/// Context limits below this are accepted but leave almost no room for history
const SMALL_CONTEXT_LIMIT: usize = 1000;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration validator collecting errors and warnings.
pub struct ConfigValidator<'a> {
    /// Configuration to validate
    config: &'a Config,
    /// Validation errors collected during validation
    errors: Vec<String>,
    /// Validation warnings collected during validation
    warnings: Vec<String>,
}

///
/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/* --- implementations --------------------------------------------------------------------- */

impl<'a> ConfigValidator<'a> {
    /// Create a new configuration validator
    ///
    /// # Arguments
    /// * `config` - Configuration to validate
    pub fn new(config: &'a Config) -> Self {
        Self { config, errors: Vec::new(), warnings: Vec::new() }
    }

    /// Run every check and return the collected findings
    pub fn report(mut self) -> ValidationReport {
        self.validate_server_config();
        self.validate_upstream_config();
        self.validate_classifier_config();
        self.validate_security_requirements();

        ValidationReport { errors: self.errors, warnings: self.warnings }
    }

    /// Perform configuration validation
    ///
    /// Warnings are logged; errors are collected and returned together.
    ///
    /// # Returns
    /// * `Ok(())` - Configuration is valid
    /// * `Err(ProxyError)` - Configuration validation failed with detailed errors
    pub fn validate(self) -> Result<()> {
        let report = self.report();

        for warning in &report.warnings {
            tracing::warn!("Configuration warning: {}", warning);
        }

        if !report.errors.is_empty() {
            let error_msg = format!(
                "Configuration validation failed with {} error(s):\n\n{}\n\
                 \n\
                 Please fix these issues and try again.\n\
                 Run 'bingmux config init' to write an example configuration.",
                report.errors.len(),
                report
                    .errors
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {}", i + 1, e))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            return Err(ProxyError::Config(error_msg));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /* --- private validation methods ------------------------------------------------------ */

    /// Validate server configuration
    fn validate_server_config(&mut self) {
        let server = &self.config.server;

        if server.port == 0 {
            self.add_error("Invalid server port 0: must be between 1 and 65535".to_string());
        } else if server.port < 1024 {
            self.add_warning(format!(
                "Server port {} requires root/administrator privileges",
                server.port
            ));
        }

        if server.api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            self.add_error("server.api_key is set but empty".to_string());
        }
    }

    /// Validate upstream addresses and timeouts
    fn validate_upstream_config(&mut self) {
        let upstream = &self.config.upstream;

        let endpoint = upstream.endpoint.as_str();
        if endpoint.starts_with("http://") {
            self.add_warning(format!(
                "Upstream endpoint '{}' uses plain http: session cookies travel unencrypted",
                endpoint
            ));
        } else if !endpoint.starts_with("https://") {
            self.add_error(format!(
                "Invalid upstream.endpoint '{}': must start with http:// or https://",
                endpoint
            ));
        }

        let chathub = upstream.chathub_url.as_str();
        if chathub.starts_with("ws://") {
            self.add_warning(format!(
                "ChatHub URL '{}' uses plain ws: conversation signatures travel unencrypted",
                chathub
            ));
        } else if !chathub.starts_with("wss://") {
            self.add_error(format!(
                "Invalid upstream.chathub_url '{}': must start with ws:// or wss://",
                chathub
            ));
        }

        if upstream.user_agent.trim().is_empty() {
            self.add_error("upstream.user_agent cannot be empty".to_string());
        }

        let timeouts = [
            ("request_timeout_secs", upstream.request_timeout_secs),
            ("connect_timeout_secs", upstream.connect_timeout_secs),
            ("frame_idle_timeout_secs", upstream.frame_idle_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                self.add_error(format!("upstream.{} cannot be zero", name));
            }
        }

        if upstream.context_limit < SMALL_CONTEXT_LIMIT {
            self.add_warning(format!(
                "Small context limit ({} chars): prior messages will mostly be dropped",
                upstream.context_limit
            ));
        }
    }

    /// Validate classifier overrides
    fn validate_classifier_config(&mut self) {
        if let Err(e) = ErrorClassifier::from_config(&self.config.classifier) {
            self.add_error(e.to_string());
        }
    }

    /// Validate security requirements
    fn validate_security_requirements(&mut self) {
        if self.config.server.api_key.is_none() {
            self.add_warning(
                "No server.api_key configured: the gateway accepts unauthenticated callers"
                    .to_string(),
            );
        }

        if self.config.server.log_level == LogLevel::Trace {
            self.add_warning(
                "Trace log level enabled: upstream frames are logged verbatim".to_string(),
            );
        }
    }

    /// Add a validation error
    fn add_error(&mut self, error: String) {
        tracing::debug!("Validation error: {}", error);
        self.errors.push(error);
    }

    /// Add a validation warning
    fn add_warning(&mut self, warning: String) {
        tracing::debug!("Validation warning: {}", warning);
        self.warnings.push(warning);
    }
}

impl ValidationReport {
    /// Whether the configuration can be used
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/* --- tests ------------------------------------------------------------------------------- */
