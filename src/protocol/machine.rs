//!
//! Per-turn state machine for the duplex streaming protocol.
//!
//! One [`TurnMachine`] drives exactly one turn over one connection:
//! `Idle -> Connecting -> Negotiating -> AwaitingFrames -> Draining -> Closed`,
//! with `Failed` reachable from every non-terminal state and `Cancelled` from
//! `Connecting`, `Negotiating` and `AwaitingFrames`. Every suspension point
//! races the cancellation token, and the connection is closed on every exit path.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::error::{ProxyError, Result};
use crate::protocol::transport::{Connector, FrameTransport};
use crate::protocol::{FrameAction, ProtocolEvent, decode_frames, handshake_frame, keepalive_frame};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Lifecycle state of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Connecting,
    Negotiating,
    AwaitingFrames,
    Draining,
    Closed,
    Cancelled,
    Failed,
}

///
/// Drives a single turn and records every state it passes through.
pub struct TurnMachine {
    /** current state */
    state: TurnState,
    /** every state entered, in order, starting with `Idle` */
    history: Vec<TurnState>,
    /** last cumulative answer text observed */
    last_text: String,
    /** longest silence tolerated between inbound messages */
    idle_timeout: Duration,
    /** classifier for upstream result codes */
    classifier: Arc<ErrorClassifier>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl TurnState {
    /// Closed, Cancelled and Failed end a turn
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Closed | TurnState::Cancelled | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TurnMachine {
    ///
    /// Create an idle machine.
    ///
    /// # Arguments
    ///  * `idle_timeout` - longest silence tolerated while awaiting frames
    ///  * `classifier` - classifier for upstream result codes
    pub fn new(idle_timeout: Duration, classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            state: TurnState::Idle,
            history: vec![TurnState::Idle],
            last_text: String::new(),
            idle_timeout,
            classifier,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[TurnState] {
        &self.history
    }

    ///
    /// Run one turn to a terminal state.
    ///
    /// Events are delivered on `events` in arrival order; `TurnComplete` is the
    /// last event of a successful turn and nothing is sent after a terminal
    /// state is reached. A dropped event receiver counts as cancellation.
    ///
    /// # Arguments
    ///  * `connector` - opens the duplex connection
    ///  * `turn_frame` - the encoded turn request
    ///  * `cancel` - cancellation token checked at every suspension point
    ///  * `events` - sink for protocol events
    ///
    /// # Returns
    ///  * the final cumulative answer text
    ///  * `ProxyError::TurnCancelled` if cancelled
    ///  * `ProxyError::ProtocolDesync` on undecodable frames, early disconnect or idle timeout
    ///  * `ProxyError::Upstream` when the upstream ends the turn with an error
    pub async fn run(
        &mut self,
        connector: &dyn Connector,
        turn_frame: String,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ProtocolEvent>,
    ) -> Result<String> {
        if self.state != TurnState::Idle {
            return Err(ProxyError::ProtocolDesync(format!(
                "turn machine reused in state {}",
                self.state
            )));
        }

        self.transition(TurnState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProxyError::TurnCancelled),
            connected = connector.connect() => connected,
        };
        let mut transport = match connected {
            Ok(transport) => transport,
            Err(e) => return Err(self.terminate(e)),
        };

        let outcome = self.drive(transport.as_mut(), turn_frame, cancel, events).await;
        transport.close().await;

        match outcome {
            Ok(()) => {
                let text = self.last_text.clone();
                let complete = ProtocolEvent::TurnComplete { text };
                // the upstream turn has ended; a late cancel only withholds the event
                if let Err(e) = self.emit(complete, cancel, events).await {
                    tracing::debug!("Turn complete event not delivered: {}", e);
                }
                self.transition(TurnState::Closed);
                Ok(self.last_text.clone())
            }
            Err(e) => Err(self.terminate(e)),
        }
    }

    /* --- private methods ----------------------------------------------------------------- */

    async fn drive(
        &mut self,
        transport: &mut dyn FrameTransport,
        turn_frame: String,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ProtocolEvent>,
    ) -> Result<()> {
        self.transition(TurnState::Negotiating);
        for frame in [handshake_frame(), keepalive_frame()] {
            send(transport, frame, cancel).await?;
        }

        self.transition(TurnState::AwaitingFrames);
        send(transport, turn_frame, cancel).await?;
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProxyError::TurnCancelled),
                _ = events.closed() => return Err(ProxyError::TurnCancelled),
                received = tokio::time::timeout(self.idle_timeout, transport.recv()) => received,
            };

            let raw = match received {
                Err(_) => {
                    return Err(ProxyError::ProtocolDesync(format!(
                        "no frame received within {:?}",
                        self.idle_timeout
                    )));
                }
                Ok(None) => {
                    return Err(ProxyError::ProtocolDesync(
                        "connection closed before end of turn".to_string(),
                    ));
                }
                Ok(Some(raw)) => raw?,
            };

            for frame in decode_frames(&raw)? {
                match frame.action() {
                    FrameAction::Ignore => {}
                    FrameAction::Update(update) => {
                        for event in update {
                            self.emit(event, cancel, events).await?;
                        }
                    }
                    FrameAction::Close { error } => {
                        let message = error.unwrap_or_else(|| "connection closed".to_string());
                        let kind = self.classify(&message);
                        return Err(ProxyError::upstream(kind, message));
                    }
                    FrameAction::End { events: tail, final_text, result_code, result_message } => {
                        for event in tail {
                            self.emit(event, cancel, events).await?;
                        }
                        let failure = result_code.filter(|c| !c.is_empty()).and_then(|code| {
                            self.classifier.classify_code(&code).map(|kind| (kind, code))
                        });
                        if let Some((kind, code)) = failure {
                            return Err(ProxyError::upstream(kind, result_message.unwrap_or(code)));
                        }
                        if let Some(text) = final_text.filter(|t| !t.is_empty()) {
                            self.last_text = text;
                        }
                        self.transition(TurnState::Draining);
                        return Ok(());
                    }
                }
            }
        }
    }

    ///
    /// Deliver one event, tracking the cumulative answer text.
    async fn emit(
        &mut self,
        event: ProtocolEvent,
        cancel: &CancellationToken,
        events: &mpsc::Sender<ProtocolEvent>,
    ) -> Result<()> {
        if let ProtocolEvent::PartialAnswer { text } = &event {
            if *text == self.last_text {
                return Ok(());
            }
            self.last_text = text.clone();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProxyError::TurnCancelled),
            sent = events.send(event) => sent.map_err(|_| ProxyError::TurnCancelled),
        }
    }

    fn classify(&self, error: &str) -> ErrorKind {
        self.classifier.classify_code(error).unwrap_or(ErrorKind::BingUnknown)
    }

    /// Move to the terminal state matching `error` and hand it back
    fn terminate(&mut self, error: ProxyError) -> ProxyError {
        if matches!(error, ProxyError::TurnCancelled) {
            tracing::debug!("Turn cancelled in state {}", self.state);
            self.transition(TurnState::Cancelled);
        } else {
            tracing::error!("Turn failed in state {}: {}", self.state, error);
            self.transition(TurnState::Failed);
        }
        error
    }

    fn transition(&mut self, next: TurnState) {
        tracing::debug!("Turn state {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

async fn send(
    transport: &mut dyn FrameTransport,
    frame: String,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProxyError::TurnCancelled),
        sent = transport.send(frame) => sent,
    }
}
