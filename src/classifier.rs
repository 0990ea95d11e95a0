//!
//! Upstream failure classification.
//!
//! Maps HTTP status codes and structured upstream result codes onto the closed
//! [`ErrorKind`] taxonomy. The built-in mapping reflects what the upstream has been
//! observed to send; every rule can be overridden from the `[classifier]` config
//! section because the upstream does not document its codes.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClassifierConfig;
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Stable error taxonomy exposed past the bridge core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /** turn or quota of the conversation exceeded */
    ConversationLimit,
    /** session rejected by the upstream */
    BingUnauthorized,
    /** access denied */
    BingForbidden,
    /** challenge / verification required */
    BingCaptcha,
    /** rate limited */
    BingThrottleLimit,
    /** image operation credential rejected */
    BingImageUnauthorized,
    /** no recognizable signal */
    BingUnknown,
}

///
/// Rule set turning upstream signals into [`ErrorKind`]s.
///
/// Cheap to clone; one instance is shared by the session store, the
/// conversation handshake and the turn state machine.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /** HTTP status → kind */
    status_rules: HashMap<u16, ErrorKind>,
    /** lower-cased result code → kind */
    code_rules: HashMap<String, ErrorKind>,
}

/* --- constants ------------------------------------------------------------------------------ */

/** result code the upstream uses for a successful turn or handshake */
pub const SUCCESS_CODE: &str = "Success";

/** built-in status mapping */
const DEFAULT_STATUS_RULES: &[(u16, ErrorKind)] = &[
    (401, ErrorKind::BingUnauthorized),
    (403, ErrorKind::BingForbidden),
    (429, ErrorKind::BingThrottleLimit),
];

/** built-in result code mapping, keys lower-case */
const DEFAULT_CODE_RULES: &[(&str, ErrorKind)] = &[
    ("unauthorizedrequest", ErrorKind::BingUnauthorized),
    ("invalidsession", ErrorKind::BingUnauthorized),
    ("forbidden", ErrorKind::BingForbidden),
    ("captchachallenge", ErrorKind::BingCaptcha),
    ("throttled", ErrorKind::BingThrottleLimit),
    ("toomanyrequests", ErrorKind::BingThrottleLimit),
    ("conversationlimitreached", ErrorKind::ConversationLimit),
    ("turnlimitreached", ErrorKind::ConversationLimit),
];

/* --- start of code -------------------------------------------------------------------------- */

impl ErrorKind {
    ///
    /// Wire name of the kind, e.g. `BING_CAPTCHA`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConversationLimit => "CONVERSATION_LIMIT",
            ErrorKind::BingUnauthorized => "BING_UNAUTHORIZED",
            ErrorKind::BingForbidden => "BING_FORBIDDEN",
            ErrorKind::BingCaptcha => "BING_CAPTCHA",
            ErrorKind::BingThrottleLimit => "BING_THROTTLE_LIMIT",
            ErrorKind::BingImageUnauthorized => "BING_IMAGE_UNAUTHORIZED",
            ErrorKind::BingUnknown => "BING_UNKNOWN",
        }
    }

    ///
    /// Whether the stored session can no longer be used after this failure.
    pub fn is_session_terminal(self) -> bool {
        matches!(self, ErrorKind::BingCaptcha | ErrorKind::BingUnauthorized)
    }

    ///
    /// Whether the failure is advisory only (does not by itself abort a turn).
    pub fn is_advisory(self) -> bool {
        matches!(self, ErrorKind::BingThrottleLimit)
    }

    ///
    /// Parse a wire name (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CONVERSATION_LIMIT" => Ok(ErrorKind::ConversationLimit),
            "BING_UNAUTHORIZED" => Ok(ErrorKind::BingUnauthorized),
            "BING_FORBIDDEN" => Ok(ErrorKind::BingForbidden),
            "BING_CAPTCHA" => Ok(ErrorKind::BingCaptcha),
            "BING_THROTTLE_LIMIT" => Ok(ErrorKind::BingThrottleLimit),
            "BING_IMAGE_UNAUTHORIZED" => Ok(ErrorKind::BingImageUnauthorized),
            "BING_UNKNOWN" => Ok(ErrorKind::BingUnknown),
            _ => Err(ProxyError::Config(format!(
                "Invalid error kind '{}'. Valid kinds are: CONVERSATION_LIMIT, \
                 BING_UNAUTHORIZED, BING_FORBIDDEN, BING_CAPTCHA, BING_THROTTLE_LIMIT, \
                 BING_IMAGE_UNAUTHORIZED, BING_UNKNOWN",
                s
            ))),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            status_rules: DEFAULT_STATUS_RULES.iter().copied().collect(),
            code_rules: DEFAULT_CODE_RULES.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

impl ErrorClassifier {
    ///
    /// Create a classifier with the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Create a classifier with the built-in rules overridden by configuration.
    ///
    /// # Arguments
    ///  * `config` - `[classifier]` section with status and code overrides
    ///
    /// # Returns
    ///  * Classifier with merged rules
    ///  * `ProxyError::Config` if a status key is not a valid HTTP status
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let mut classifier = Self::default();

        for (status, kind) in &config.status {
            let code = status.trim().parse::<u16>().ok().filter(|c| (100..=599).contains(c));
            let code = code.ok_or_else(|| {
                ProxyError::Config(format!(
                    "Invalid classifier status '{}': must be an HTTP status code (100-599)",
                    status
                ))
            })?;
            classifier.status_rules.insert(code, *kind);
        }

        for (code, kind) in &config.codes {
            classifier.code_rules.insert(code.to_lowercase(), *kind);
        }

        Ok(classifier)
    }

    ///
    /// Classify an HTTP status code alone.
    pub fn classify_status(&self, status: u16) -> ErrorKind {
        self.status_rules.get(&status).copied().unwrap_or(ErrorKind::BingUnknown)
    }

    ///
    /// Classify a structured upstream result code.
    ///
    /// # Returns
    ///  * `None` for the success code
    ///  * the mapped kind, or `BING_UNKNOWN` for unrecognized codes
    pub fn classify_code(&self, code: &str) -> Option<ErrorKind> {
        if code.eq_ignore_ascii_case(SUCCESS_CODE) {
            return None;
        }
        Some(self.code_rules.get(&code.to_lowercase()).copied().unwrap_or(ErrorKind::BingUnknown))
    }

    ///
    /// Classify a failed upstream HTTP response.
    ///
    /// A recognized structured code in the body wins over the status; an
    /// unrecognized body falls back to the status mapping.
    ///
    /// # Arguments
    ///  * `status` - HTTP status code
    ///  * `body` - response body text (may be empty or non-JSON)
    pub fn classify_response(&self, status: u16, body: &str) -> ErrorKind {
        if let Some(code) = extract_error_code(body) {
            if let Some(kind) = self.code_rules.get(&code.to_lowercase()) {
                return *kind;
            }
        }
        self.classify_status(status)
    }
}

///
/// Pull a structured error code out of an upstream response body.
///
/// Looks at `result.value`, `error.code`, `code` and `value`, in that order.
pub fn extract_error_code(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/result/value"),
        value.pointer("/error/code"),
        value.get("code"),
        value.get("value"),
    ];
    candidates.into_iter().flatten().find_map(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify_status(401), ErrorKind::BingUnauthorized);
        assert_eq!(classifier.classify_status(403), ErrorKind::BingForbidden);
        assert_eq!(classifier.classify_status(429), ErrorKind::BingThrottleLimit);
        assert_eq!(classifier.classify_status(500), ErrorKind::BingUnknown);
    }

    #[test]
    fn test_body_code_wins_over_status() {
        let classifier = ErrorClassifier::new();
        let body = r#"{"result":{"value":"CaptchaChallenge","message":"solve it"}}"#;
        assert_eq!(classifier.classify_response(200, body), ErrorKind::BingCaptcha);
        assert_eq!(classifier.classify_response(403, body), ErrorKind::BingCaptcha);
    }

    #[test]
    fn test_unrecognized_body_falls_back_to_status() {
        let classifier = ErrorClassifier::new();
        let busy = classifier.classify_response(429, "<html>busy</html>");
        assert_eq!(busy, ErrorKind::BingThrottleLimit);
        assert_eq!(
            classifier.classify_response(418, r#"{"result":{"value":"Teapot"}}"#),
            ErrorKind::BingUnknown
        );
    }

    #[test]
    fn test_classify_code() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify_code("Success"), None);
        assert_eq!(classifier.classify_code("Throttled"), Some(ErrorKind::BingThrottleLimit));
        let unauthorized = classifier.classify_code("UnauthorizedRequest");
        assert_eq!(unauthorized, Some(ErrorKind::BingUnauthorized));
        assert_eq!(classifier.classify_code("SomethingNew"), Some(ErrorKind::BingUnknown));
    }

    #[test]
    fn test_overrides_from_config() {
        let mut config = ClassifierConfig::default();
        config.status.insert("503".to_string(), ErrorKind::BingThrottleLimit);
        config.codes.insert("ImageUnauthorized".to_string(), ErrorKind::BingImageUnauthorized);
        config.codes.insert("Throttled".to_string(), ErrorKind::ConversationLimit);

        let classifier = ErrorClassifier::from_config(&config).unwrap();
        assert_eq!(classifier.classify_status(503), ErrorKind::BingThrottleLimit);
        let image = classifier.classify_code("imageunauthorized");
        assert_eq!(image, Some(ErrorKind::BingImageUnauthorized));
        assert_eq!(classifier.classify_code("Throttled"), Some(ErrorKind::ConversationLimit));
        // untouched defaults survive
        assert_eq!(classifier.classify_status(401), ErrorKind::BingUnauthorized);
    }

    #[test]
    fn test_invalid_status_override() {
        let mut config = ClassifierConfig::default();
        config.status.insert("abc".to_string(), ErrorKind::BingUnknown);
        assert!(ErrorClassifier::from_config(&config).is_err());
    }

    #[test]
    fn test_session_terminal_and_advisory() {
        assert!(ErrorKind::BingCaptcha.is_session_terminal());
        assert!(ErrorKind::BingUnauthorized.is_session_terminal());
        assert!(!ErrorKind::BingThrottleLimit.is_session_terminal());
        assert!(ErrorKind::BingThrottleLimit.is_advisory());
    }

    #[test]
    fn test_wire_names_round_trip_through_serde() {
        let json = serde_json::to_string(&ErrorKind::BingImageUnauthorized).unwrap();
        assert_eq!(json, "\"BING_IMAGE_UNAUTHORIZED\"");
        assert_eq!(ErrorKind::parse("conversation_limit").unwrap(), ErrorKind::ConversationLimit);
        assert!(ErrorKind::parse("NOPE").is_err());
    }

    #[test]
    fn test_extract_error_code_variants() {
        let nested = extract_error_code(r#"{"error":{"code":"Forbidden"}}"#);
        assert_eq!(nested.as_deref(), Some("Forbidden"));
        assert_eq!(extract_error_code(r#"{"code":"Throttled"}"#).as_deref(), Some("Throttled"));
        assert_eq!(extract_error_code("not json"), None);
        assert_eq!(extract_error_code("{}"), None);
    }
}
