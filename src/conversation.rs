//!
//! Conversation handshake and per-conversation context.
//!
//! Before any turn can be sent the upstream must create a conversation, which
//! yields the opaque triple (conversation id, client id, signature) every turn
//! frame carries.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use reqwest::header::{ACCEPT, COOKIE, HeaderMap, USER_AGENT};
use serde::Deserialize;

use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use crate::protocol::Throttling;
use crate::session::SessionStore;

/* --- constants ------------------------------------------------------------------------------ */

/** client identification the upstream web client sends alongside the user agent */
pub const MS_USER_AGENT: &str =
    "azsdk-js-api-client-factory/1.0.0-beta.1 core-rest-pipeline/1.12.0 OS/Win32";

/** response header carrying the signature when the body omits it */
pub const SIGNATURE_HEADER: &str = "x-sydney-encryptedconversationsignature";

/** path of the conversation create endpoint */
const CREATE_PATH: &str = "/turing/conversation/create";

/* --- types ----------------------------------------------------------------------------------- */

///
/// State of one caller-visible conversation.
///
/// The identifiers never change after creation; only the turn counter moves,
/// by exactly one per completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    /** upstream conversation identifier */
    conversation_id: String,
    /** upstream participant identifier */
    client_id: String,
    /** conversation signature */
    signature: String,
    /** number of completed turns */
    turn: u32,
    /** most recent message budget reported by the upstream */
    last_throttling: Option<Throttling>,
}

///
/// Opens new conversations against the upstream.
pub struct ConversationHandshake {
    /** shared HTTP client */
    client: reqwest::Client,
    /** process-wide session */
    session: Arc<SessionStore>,
    /** status/code classifier for create failures */
    classifier: Arc<ErrorClassifier>,
    /** upstream site root, without trailing slash */
    endpoint: String,
    /** outbound identification string */
    user_agent: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    conversation_id: Option<String>,
    client_id: Option<String>,
    conversation_signature: Option<String>,
    result: Option<CreateResult>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateResult {
    value: Option<String>,
    message: Option<String>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl ConversationContext {
    ///
    /// Create a context at turn 0.
    pub fn new(
        conversation_id: impl Into<String>,
        client_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            client_id: client_id.into(),
            signature: signature.into(),
            turn: 0,
            last_throttling: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Number of completed turns, also the next turn's invocation id
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// True exactly while no turn has completed
    pub fn is_start_of_session(&self) -> bool {
        self.turn == 0
    }

    /// Record one completed turn
    pub fn complete_turn(&mut self) {
        self.turn += 1;
    }

    pub fn last_throttling(&self) -> Option<Throttling> {
        self.last_throttling
    }

    /// Remember the latest message budget
    pub fn note_throttling(&mut self, throttling: Throttling) {
        self.last_throttling = Some(throttling);
    }

    /// Whether the last reported budget is used up
    pub fn is_limit_reached(&self) -> bool {
        self.last_throttling.is_some_and(|t| t.is_exhausted())
    }
}

impl ConversationHandshake {
    ///
    /// Create a handshake bound to the shared session.
    ///
    /// # Arguments
    ///  * `client` - HTTP client for the create request
    ///  * `session` - process-wide session store
    ///  * `classifier` - classifier for create failures
    ///  * `upstream` - upstream addresses and identification
    pub fn new(
        client: reqwest::Client,
        session: Arc<SessionStore>,
        classifier: Arc<ErrorClassifier>,
        upstream: &UpstreamConfig,
    ) -> Self {
        Self {
            client,
            session,
            classifier,
            endpoint: upstream.base_url().to_string(),
            user_agent: upstream.user_agent.clone(),
        }
    }

    ///
    /// Open a new conversation.
    ///
    /// Ensures a session, requests a new conversation and merges any credentials
    /// the response re-issues.
    ///
    /// # Returns
    ///  * a context at turn 0
    ///  * `ProxyError::SessionAcquisitionFailed` if no session could be acquired
    ///  * `ProxyError::ConversationCreateFailed` on a non-success status, an
    ///    upstream result code, or a body without conversation id
    pub async fn open(&self) -> Result<ConversationContext> {
        let session = self.session.ensure().await?;

        let url = format!("{}{}", self.endpoint, CREATE_PATH);
        tracing::debug!("Creating conversation at {}", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .header("x-ms-useragent", MS_USER_AGENT)
            .header(COOKIE, session.cookie_header())
            .send()
            .await
            .map_err(|e| create_failed(ErrorKind::BingUnknown, format!("request failed: {}", e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        self.session.refresh(&headers).await;

        let body = response
            .text()
            .await
            .map_err(|e| create_failed(ErrorKind::BingUnknown, format!("unreadable body: {}", e)))?;

        if !status.is_success() {
            let kind = self.classifier.classify_response(status.as_u16(), &body);
            tracing::error!("Conversation create returned {} ({})", status, kind);
            return Err(create_failed(kind, format!("conversation create returned {}", status)));
        }

        let parsed: CreateResponse = serde_json::from_str(&body).map_err(|e| {
            create_failed(ErrorKind::BingUnknown, format!("invalid create response: {}", e))
        })?;

        self.build_context(parsed, &headers)
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn build_context(
        &self,
        parsed: CreateResponse,
        headers: &HeaderMap,
    ) -> Result<ConversationContext> {
        if let Some(result) = &parsed.result {
            let code = result.value.as_deref().filter(|code| !code.is_empty());
            if let Some(kind) = code.and_then(|code| self.classifier.classify_code(code)) {
                let message = result.message.clone().or(result.value.clone()).unwrap_or_default();
                return Err(create_failed(kind, message));
            }
        }

        let conversation_id = parsed
            .conversation_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                create_failed(ErrorKind::BingUnknown, "response carried no conversationId")
            })?;

        let signature = parsed
            .conversation_signature
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
            })
            .unwrap_or_default();
        if signature.is_empty() {
            tracing::warn!("Conversation {} has no signature", conversation_id);
        }

        tracing::info!("Opened conversation {}", conversation_id);
        let client_id = parsed.client_id.unwrap_or_default();
        Ok(ConversationContext::new(conversation_id, client_id, signature))
    }
}

fn create_failed(kind: ErrorKind, message: impl Into<String>) -> ProxyError {
    ProxyError::ConversationCreateFailed { kind, message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_counter() {
        let mut ctx = ConversationContext::new("c", "p", "s");
        assert!(ctx.is_start_of_session());
        ctx.complete_turn();
        ctx.complete_turn();
        assert_eq!(ctx.turn(), 2);
        assert!(!ctx.is_start_of_session());
        assert_eq!(ctx.conversation_id(), "c");
    }

    #[test]
    fn test_limit_tracking() {
        let mut ctx = ConversationContext::new("c", "p", "s");
        assert!(!ctx.is_limit_reached());
        ctx.note_throttling(Throttling {
            max_num_user_messages_in_conversation: 3,
            num_user_messages_in_conversation: 3,
        });
        assert!(ctx.is_limit_reached());
    }
}
