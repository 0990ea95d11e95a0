//!
//! Anonymous session management for the upstream chat service.
//!
//! The upstream authenticates callers with a handful of cookies issued on an
//! unauthenticated probe of the site root. [`SessionStore`] owns the single
//! process-wide [`Session`], acquires it lazily and merges every credential
//! update the upstream issues afterwards.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE, USER_AGENT};
use tokio::sync::Mutex;

use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** names of the cookies that make up the upstream identity */
pub const SESSION_TOKENS: [&str; 3] = ["_U", "MUID", "MUIDB"];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Upstream credential material.
///
/// A small map of allow-listed cookie tokens plus the time the session was
/// first acquired. Tokens are kept sorted so the rendered cookie header is
/// stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /** allow-listed cookie tokens, name to value */
    tokens: BTreeMap<String, String>,
    /** when the session was acquired */
    acquired_at: DateTime<Utc>,
}

///
/// Owner of the process-wide [`Session`].
///
/// Acquisition and refresh are serialized through one async lock; concurrent
/// callers that find no session wait for the first probe instead of issuing
/// their own.
pub struct SessionStore {
    /** shared HTTP client */
    client: reqwest::Client,
    /** upstream site root, without trailing slash */
    endpoint: String,
    /** outbound identification string */
    user_agent: String,
    /** status/code classifier for probe failures */
    classifier: Arc<ErrorClassifier>,
    /** the live session, if any */
    session: Mutex<Option<Session>>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl Session {
    ///
    /// Create a session from already-extracted tokens, stamped now.
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self { tokens, acquired_at: Utc::now() }
    }

    /// Value of one named token
    pub fn token(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    /// Names of the tokens currently held
    pub fn token_names(&self) -> Vec<&str> {
        self.tokens.keys().map(String::as_str).collect()
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    ///
    /// Render the tokens as a `Cookie` request header value.
    ///
    /// # Returns
    ///  * `name=value` pairs joined by `; `
    pub fn cookie_header(&self) -> String {
        self.tokens
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    ///
    /// Merge newly issued tokens into this session.
    ///
    /// Later wins per token; tokens not mentioned are kept.
    ///
    /// # Arguments
    ///  * `tokens` - freshly issued tokens
    ///
    /// # Returns
    ///  * number of tokens whose value was added or changed
    pub fn merge(&mut self, tokens: BTreeMap<String, String>) -> usize {
        let mut changed = 0;
        for (name, value) in tokens {
            if self.tokens.get(&name) != Some(&value) {
                self.tokens.insert(name, value);
                changed += 1;
            }
        }
        changed
    }
}

///
/// Extract the allow-listed session tokens from a response's `Set-Cookie` headers.
///
/// Handles both one cookie per header and several cookies folded into a single
/// comma-separated header. Commas inside `Expires` attributes never produce a
/// token because only the leading `name=value` of each cookie is considered.
///
/// # Arguments
///  * `headers` - response headers
///
/// # Returns
///  * the allow-listed tokens found, possibly empty
pub fn extract_tokens(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut tokens = BTreeMap::new();

    for raw in headers.get_all(SET_COOKIE) {
        let Ok(raw) = raw.to_str() else {
            continue;
        };
        for cookie in raw.split(',') {
            let pair = cookie.split(';').next().unwrap_or_default().trim();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if SESSION_TOKENS.contains(&name) {
                    tokens.insert(name.to_string(), value.trim().to_string());
                }
            }
        }
    }

    tokens
}

impl SessionStore {
    ///
    /// Create an empty store; nothing is fetched until [`SessionStore::ensure`].
    ///
    /// # Arguments
    ///  * `client` - HTTP client used for the probe
    ///  * `upstream` - upstream addresses and identification
    ///  * `classifier` - classifier for probe failures
    pub fn new(
        client: reqwest::Client,
        upstream: &UpstreamConfig,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        Self {
            client,
            endpoint: upstream.base_url().to_string(),
            user_agent: upstream.user_agent.clone(),
            classifier,
            session: Mutex::new(None),
        }
    }

    ///
    /// Return the live session, acquiring one first if none exists.
    ///
    /// Acquisition issues an unauthenticated GET to the site root and keeps the
    /// allow-listed tokens from its `Set-Cookie` headers.
    ///
    /// # Returns
    ///  * a snapshot of the live session
    ///  * `ProxyError::SessionAcquisitionFailed` if the probe fails or carries no token
    pub async fn ensure(&self) -> Result<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = self.acquire().await?;
        tracing::info!("Acquired upstream session with tokens {:?}", session.token_names());
        *guard = Some(session.clone());
        Ok(session)
    }

    ///
    /// Merge credentials issued on any later upstream response.
    ///
    /// When no session is live (never acquired, or invalidated) and the headers
    /// carry tokens, they become the new session.
    ///
    /// # Arguments
    ///  * `headers` - response headers of an upstream call
    ///
    /// # Returns
    ///  * number of tokens added or changed
    pub async fn refresh(&self, headers: &HeaderMap) -> usize {
        let tokens = extract_tokens(headers);
        if tokens.is_empty() {
            return 0;
        }

        let mut guard = self.session.lock().await;
        let changed = match guard.as_mut() {
            Some(session) => session.merge(tokens),
            None => {
                let count = tokens.len();
                *guard = Some(Session::new(tokens));
                count
            }
        };

        if changed > 0 {
            tracing::debug!("Refreshed {} upstream session token(s)", changed);
        }
        changed
    }

    ///
    /// Drop the live session so the next [`SessionStore::ensure`] probes again.
    pub async fn invalidate(&self) {
        let mut guard = self.session.lock().await;
        if guard.take().is_some() {
            tracing::warn!("Upstream session invalidated; next request will re-acquire");
        }
    }

    /// Snapshot of the live session without acquiring
    pub async fn current(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    /* --- private methods ----------------------------------------------------------------- */

    async fn acquire(&self) -> Result<Session> {
        let url = format!("{}/", self.endpoint);
        tracing::debug!("Probing {} for session cookies", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| ProxyError::SessionAcquisitionFailed {
                kind: ErrorKind::BingUnknown,
                message: format!("session probe failed: {}", e),
            })?;

        let status = response.status();
        let tokens = extract_tokens(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = self.classifier.classify_response(status.as_u16(), &body);
            tracing::error!("Session probe returned {} ({})", status, kind);
            return Err(ProxyError::SessionAcquisitionFailed {
                kind,
                message: format!("session probe returned {}", status),
            });
        }

        if tokens.is_empty() {
            return Err(ProxyError::SessionAcquisitionFailed {
                kind: ErrorKind::BingUnauthorized,
                message: "session probe response carried no session cookie".to_string(),
            });
        }

        Ok(Session::new(tokens))
    }
}
