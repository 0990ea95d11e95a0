//!
//! Bridge from caller turns to the upstream chat protocol.
//!
//! [`ChatBridge`] owns the shared session and wires the conversation
//! handshake, the turn state machine and the event translator together for
//! one turn at a time. Protocol events flow from the machine to the
//! translator over a bounded channel, in arrival order.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::config::UpstreamConfig;
use crate::conversation::{ConversationContext, ConversationHandshake};
use crate::error::{ProxyError, Result};
use crate::protocol::machine::{TurnMachine, TurnState};
use crate::protocol::transport::{Connector, WsConnector};
use crate::protocol::{Throttling, TurnRequest, new_trace_token, turn_frame};
use crate::session::SessionStore;
use crate::translator::Translator;

/* --- constants ------------------------------------------------------------------------------ */

/** buffer between the state machine and the translator */
const EVENT_CHANNEL_BUFFER: usize = 64;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Entry point to the upstream for the rest of the application.
pub struct ChatBridge {
    /** process-wide session */
    session: Arc<SessionStore>,
    /** opens conversations */
    handshake: ConversationHandshake,
    /** shared classifier */
    classifier: Arc<ErrorClassifier>,
    /** ChatHub address */
    chathub_url: String,
    /** outbound identification string */
    user_agent: String,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

///
/// Outcome of one completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /** final cumulative answer text */
    pub text: String,
    /** suggested follow-ups from the final message */
    pub suggestions: Vec<String>,
    /** throttle notices seen during the turn */
    pub advisories: Vec<Throttling>,
    /** per-turn trace token sent upstream */
    pub trace_id: String,
    /** invocation id of the turn, i.e. the counter before it completed */
    pub turn: u32,
    /** terminal state the machine reached */
    pub final_state: TurnState,
}

/* --- start of code -------------------------------------------------------------------------- */

impl ChatBridge {
    ///
    /// Create a bridge with its own HTTP client.
    ///
    /// # Arguments
    ///  * `upstream` - upstream addresses, identification and timeouts
    ///  * `classifier` - shared error classifier
    ///
    /// # Returns
    ///  * the bridge, with no session acquired yet
    ///  * `ProxyError::Http` if the HTTP client cannot be built
    pub fn new(upstream: &UpstreamConfig, classifier: Arc<ErrorClassifier>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(upstream.request_timeout())
            .connect_timeout(upstream.connect_timeout())
            .build()
            .map_err(|e| ProxyError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, upstream, classifier))
    }

    ///
    /// Create a bridge around an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        upstream: &UpstreamConfig,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(client.clone(), upstream, classifier.clone()));
        let handshake =
            ConversationHandshake::new(client, session.clone(), classifier.clone(), upstream);

        Self {
            session,
            handshake,
            classifier,
            chathub_url: upstream.chathub_url.clone(),
            user_agent: upstream.user_agent.clone(),
            connect_timeout: upstream.connect_timeout(),
            idle_timeout: upstream.frame_idle_timeout(),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    ///
    /// Open a new conversation, honouring cancellation.
    ///
    /// # Returns
    ///  * a context at turn 0
    ///  * `ProxyError::TurnCancelled` if cancelled first
    ///  * the handshake's error otherwise; a session-terminal kind drops the session
    pub async fn open_conversation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ConversationContext> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::TurnCancelled),
            opened = self.handshake.open() => opened,
        };
        match opened {
            Ok(context) => Ok(context),
            Err(e) => Err(self.settle(e).await),
        }
    }

    ///
    /// Run one turn over a fresh ChatHub connection.
    ///
    /// # Arguments
    ///  * `context` - conversation the turn belongs to; its counter moves on success
    ///  * `request` - the turn request
    ///  * `cancel` - cancellation token for the whole turn
    ///  * `translator` - output side of the turn
    ///
    /// # Returns
    ///  * the turn report
    ///  * any core error; partial output already delivered stays delivered
    pub async fn run_turn(
        &self,
        context: &mut ConversationContext,
        request: &TurnRequest,
        cancel: &CancellationToken,
        translator: Translator,
    ) -> Result<TurnReport> {
        let ensured = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::TurnCancelled),
            ensured = self.session.ensure() => ensured,
        };
        let session = match ensured {
            Ok(session) => session,
            Err(e) => return Err(self.settle(e).await),
        };
        let connector = WsConnector::new(
            self.chathub_url.clone(),
            session.cookie_header(),
            self.user_agent.clone(),
            self.connect_timeout,
            self.session.clone(),
            self.classifier.clone(),
        );
        self.run_turn_with(&connector, context, request, cancel, translator).await
    }

    ///
    /// Open a conversation and run a single turn on it.
    pub async fn ask(
        &self,
        request: &TurnRequest,
        cancel: &CancellationToken,
        translator: Translator,
    ) -> Result<TurnReport> {
        let mut context = self.open_conversation(cancel).await?;
        self.run_turn(&mut context, request, cancel, translator).await
    }

    ///
    /// Run one turn over connections from `connector`.
    ///
    /// The machine and translator run concurrently; the translator sees every
    /// event in arrival order and its output closes when the machine finishes,
    /// or as soon as `cancel` fires.
    ///
    /// # Returns
    ///  * the turn report
    ///  * `ProxyError::Upstream` with `CONVERSATION_LIMIT` if the context's budget
    ///    is already used up; no connection is opened in that case
    pub async fn run_turn_with(
        &self,
        connector: &dyn Connector,
        context: &mut ConversationContext,
        request: &TurnRequest,
        cancel: &CancellationToken,
        translator: Translator,
    ) -> Result<TurnReport> {
        if context.is_limit_reached() {
            let message = format!(
                "conversation {} has used its message budget",
                context.conversation_id()
            );
            tracing::warn!("{}", message);
            return Err(ProxyError::upstream(ErrorKind::ConversationLimit, message));
        }

        let trace_id = new_trace_token();
        let turn = context.turn();
        let frame = turn_frame(context, request, &trace_id)?;
        tracing::debug!(
            "Starting turn {} of conversation {} (trace {})",
            turn,
            context.conversation_id(),
            trace_id
        );

        let mut machine = TurnMachine::new(self.idle_timeout, self.classifier.clone());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let driver = &mut machine;
        let drive = async move {
            let outcome = driver.run(connector, frame, cancel, &tx).await;
            drop(tx);
            outcome
        };

        let (outcome, summary) = tokio::join!(drive, translator.run(rx, cancel));

        if let Some(throttling) = summary.advisories.last() {
            context.note_throttling(*throttling);
        }

        match outcome {
            Ok(text) => {
                context.complete_turn();
                tracing::info!(
                    "Turn {} of conversation {} complete ({} output units)",
                    turn,
                    context.conversation_id(),
                    summary.units_emitted
                );
                Ok(TurnReport {
                    text,
                    suggestions: summary.suggestions,
                    advisories: summary.advisories,
                    trace_id,
                    turn,
                    final_state: machine.state(),
                })
            }
            Err(e) => Err(self.settle(e).await),
        }
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Drop the session when `error` says it can no longer be used
    async fn settle(&self, error: ProxyError) -> ProxyError {
        if error.kind().is_session_terminal() {
            self.session.invalidate().await;
        }
        error
    }
}
