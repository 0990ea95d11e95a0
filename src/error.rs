//!
//! Error handling for the Bing Chat to OpenAI bridge.
//!
//! Defines all error types used throughout the application using thiserror
//! for ergonomic error handling. Every variant projects onto the stable
//! [`ErrorKind`] taxonomy via [`ProxyError::kind`], which is the only error
//! vocabulary handed to callers of the bridge.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use thiserror::Error;

use crate::classifier::ErrorKind;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types.
///
/// The first group covers the gateway itself (configuration, inbound requests),
/// the second group the upstream bridge core (session, conversation, turn).
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Session acquisition failed ({kind}): {message}")]
    SessionAcquisitionFailed { kind: ErrorKind, message: String },

    #[error("Conversation create failed ({kind}): {message}")]
    ConversationCreateFailed { kind: ErrorKind, message: String },

    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    #[error("Turn cancelled")]
    TurnCancelled,

    #[error("Upstream error ({kind}): {message}")]
    Upstream { kind: ErrorKind, message: String },
}

/* --- start of code -------------------------------------------------------------------------- */

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    ///
    /// Create an upstream error of the given kind.
    pub fn upstream(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProxyError::Upstream { kind, message: message.into() }
    }

    ///
    /// Project this error onto the stable error taxonomy.
    ///
    /// Errors that carry a classified kind return it; everything else has no
    /// recognizable upstream signal and maps to `BING_UNKNOWN`.
    ///
    /// # Returns
    ///  * the taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::SessionAcquisitionFailed { kind, .. }
            | ProxyError::ConversationCreateFailed { kind, .. }
            | ProxyError::Upstream { kind, .. } => *kind,
            _ => ErrorKind::BingUnknown,
        }
    }

    ///
    /// Whether this error originates from the bridge core rather than from
    /// the inbound request or local configuration.
    pub fn is_core(&self) -> bool {
        matches!(
            self,
            ProxyError::SessionAcquisitionFailed { .. }
                | ProxyError::ConversationCreateFailed { .. }
                | ProxyError::ProtocolDesync(_)
                | ProxyError::TurnCancelled
                | ProxyError::Upstream { .. }
                | ProxyError::Request(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_projection() {
        let err = ProxyError::SessionAcquisitionFailed {
            kind: ErrorKind::BingForbidden,
            message: "probe returned 403".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::BingForbidden);
        assert_eq!(ProxyError::TurnCancelled.kind(), ErrorKind::BingUnknown);
        assert_eq!(ProxyError::ProtocolDesync("bad frame".into()).kind(), ErrorKind::BingUnknown);
        assert_eq!(
            ProxyError::upstream(ErrorKind::BingCaptcha, "challenge").kind(),
            ErrorKind::BingCaptcha
        );
    }

    #[test]
    fn test_display_contains_kind() {
        let err = ProxyError::upstream(ErrorKind::BingThrottleLimit, "slow down");
        assert_eq!(err.to_string(), "Upstream error (BING_THROTTLE_LIMIT): slow down");
    }

    #[test]
    fn test_core_errors() {
        assert!(ProxyError::TurnCancelled.is_core());
        assert!(!ProxyError::Conversion("bad".into()).is_core());
        assert!(!ProxyError::Auth("no key".into()).is_core());
    }
}
