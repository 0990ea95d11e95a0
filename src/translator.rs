//!
//! Event-to-output translation.
//!
//! Consumes the protocol events of one turn and produces the caller-facing
//! sequence of [`OutputUnit`]s, either as one complete answer (batched) or as
//! one unit per partial answer (incremental). Search lifecycle events go to an
//! optional observer; throttle notices become advisories.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ProtocolEvent, Throttling};

/* --- types ----------------------------------------------------------------------------------- */

///
/// How answer text is delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One complete unit after the turn completes
    Batched,
    /// One unit per partial answer
    Incremental,
}

///
/// Caller-facing output record.
///
/// `Partial` carries the cumulative text observed so far, never a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputUnit {
    Complete { text: String, suggestions: Vec<String> },
    Partial { text: String },
}

///
/// Ordered output sink that closes exactly once.
pub struct OutputStream {
    /** sender half; `None` once closed */
    tx: Option<mpsc::Sender<OutputUnit>>,
    /** units delivered so far */
    emitted: usize,
}

///
/// What the translator saw over the whole turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationSummary {
    /** text of the turn-complete event, if one arrived */
    pub final_text: Option<String>,
    /** latest suggestion list */
    pub suggestions: Vec<String>,
    /** every throttle notice, in arrival order */
    pub advisories: Vec<Throttling>,
    /** output units delivered */
    pub units_emitted: usize,
}

///
/// Translator for one turn.
pub struct Translator {
    mode: DeliveryMode,
    output: OutputStream,
    /** non-blocking observer for search lifecycle events */
    observer: Option<mpsc::Sender<ProtocolEvent>>,
    /** text of the last partial unit delivered */
    last_partial: Option<String>,
    summary: TranslationSummary,
}

/* --- start of code -------------------------------------------------------------------------- */

impl OutputStream {
    pub fn new(tx: mpsc::Sender<OutputUnit>) -> Self {
        Self { tx: Some(tx), emitted: 0 }
    }

    ///
    /// Deliver one unit.
    ///
    /// # Returns
    ///  * `true` if the unit was delivered
    ///  * `false` if the stream is closed or the receiver has gone away
    pub async fn push(&mut self, unit: OutputUnit) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if tx.send(unit).await.is_err() {
            tracing::debug!("Output receiver dropped; closing output stream");
            self.tx = None;
            return false;
        }
        self.emitted += 1;
        true
    }

    ///
    /// Close the stream; later calls are no-ops.
    ///
    /// # Returns
    ///  * `true` only for the call that actually closed it
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Translator {
    ///
    /// Create a translator writing to `output`.
    ///
    /// # Arguments
    ///  * `mode` - batched or incremental delivery
    ///  * `output` - receiver-facing sink for output units
    pub fn new(mode: DeliveryMode, output: mpsc::Sender<OutputUnit>) -> Self {
        Self {
            mode,
            output: OutputStream::new(output),
            observer: None,
            last_partial: None,
            summary: TranslationSummary::default(),
        }
    }

    /// Attach an observer for search lifecycle events
    pub fn with_observer(mut self, observer: mpsc::Sender<ProtocolEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    ///
    /// Translate one event.
    ///
    /// Events arriving after the output has closed only update the summary.
    pub async fn handle(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::PartialAnswer { text } => {
                if self.mode == DeliveryMode::Incremental {
                    self.push_partial(text).await;
                }
            }
            ProtocolEvent::SearchQuery { .. } | ProtocolEvent::SearchResult { .. } => {
                self.notify(event);
            }
            ProtocolEvent::Suggestions(suggestions) => {
                self.summary.suggestions = suggestions;
            }
            ProtocolEvent::ThrottleNotice(throttling) => {
                tracing::warn!(
                    "Upstream throttle notice: {}/{} user messages used",
                    throttling.num_user_messages_in_conversation,
                    throttling.max_num_user_messages_in_conversation
                );
                self.summary.advisories.push(throttling);
            }
            ProtocolEvent::TurnComplete { text } => {
                match self.mode {
                    DeliveryMode::Batched => {
                        let suggestions = self.summary.suggestions.clone();
                        self.output
                            .push(OutputUnit::Complete { text: text.clone(), suggestions })
                            .await;
                    }
                    DeliveryMode::Incremental => self.push_partial(text.clone()).await,
                }
                self.summary.final_text = Some(text);
                self.close();
            }
        }
    }

    ///
    /// Consume events until the sender side closes, then close the output.
    ///
    /// Once `cancel` fires the output closes at once: queued events are
    /// discarded and a unit still waiting for buffer space is never delivered.
    ///
    /// # Returns
    ///  * what was observed over the turn
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ProtocolEvent>,
        cancel: &CancellationToken,
    ) -> TranslationSummary {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.handle(event) => {}
            }
        }
        if cancel.is_cancelled() && !self.output.is_closed() {
            tracing::debug!("Turn cancelled; closing output after {} units", self.output.emitted());
        }
        self.finish()
    }

    /// Close the output sequence; idempotent
    pub fn close(&mut self) -> bool {
        self.output.close()
    }

    /// Close the output and hand back the summary
    pub fn finish(mut self) -> TranslationSummary {
        self.output.close();
        self.summary.units_emitted = self.output.emitted();
        self.summary
    }

    /* --- private methods ----------------------------------------------------------------- */

    async fn push_partial(&mut self, text: String) {
        if text.is_empty() || self.last_partial.as_deref() == Some(text.as_str()) {
            return;
        }
        if self.output.push(OutputUnit::Partial { text: text.clone() }).await {
            self.last_partial = Some(text);
        }
    }

    fn notify(&self, event: ProtocolEvent) {
        if let Some(observer) = &self.observer {
            if let Err(e) = observer.try_send(event) {
                tracing::debug!("Observer dropped search event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str) -> ProtocolEvent {
        ProtocolEvent::PartialAnswer { text: text.to_string() }
    }

    fn complete(text: &str) -> ProtocolEvent {
        ProtocolEvent::TurnComplete { text: text.to_string() }
    }

    async fn translate(mode: DeliveryMode, events: Vec<ProtocolEvent>) -> Vec<OutputUnit> {
        let (tx, mut rx) = mpsc::channel(16);
        let mut translator = Translator::new(mode, tx);
        for event in events {
            translator.handle(event).await;
        }
        translator.finish();
        let mut out = Vec::new();
        while let Some(unit) = rx.recv().await {
            out.push(unit);
        }
        out
    }

    #[tokio::test]
    async fn test_batched_emits_one_unit() {
        let events = vec![partial("Hi"), partial("Hi there"), complete("Hi there")];
        let units = translate(DeliveryMode::Batched, events).await;
        assert_eq!(
            units,
            vec![OutputUnit::Complete { text: "Hi there".into(), suggestions: vec![] }]
        );
    }

    #[tokio::test]
    async fn test_incremental_emits_each_partial() {
        let units = translate(
            DeliveryMode::Incremental,
            vec![partial("Hi"), partial("Hi there"), complete("Hi there")],
        )
        .await;
        assert_eq!(
            units,
            vec![
                OutputUnit::Partial { text: "Hi".into() },
                OutputUnit::Partial { text: "Hi there".into() }
            ]
        );
    }

    #[tokio::test]
    async fn test_incremental_emits_differing_final_text() {
        let units =
            translate(DeliveryMode::Incremental, vec![partial("Hi"), complete("Hi there!")]).await;
        assert_eq!(units.len(), 2);
        assert_eq!(units[1], OutputUnit::Partial { text: "Hi there!".into() });
    }

    #[tokio::test]
    async fn test_batched_without_completion_emits_nothing() {
        let units = translate(DeliveryMode::Batched, vec![partial("Hi")]).await;
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_attach_to_complete_unit() {
        let units = translate(
            DeliveryMode::Batched,
            vec![
                partial("Answer"),
                ProtocolEvent::Suggestions(vec!["More?".into()]),
                complete("Answer"),
            ],
        )
        .await;
        assert_eq!(
            units,
            vec![OutputUnit::Complete { text: "Answer".into(), suggestions: vec!["More?".into()] }]
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut translator = Translator::new(DeliveryMode::Incremental, tx);
        assert!(translator.close());
        assert!(!translator.close());

        translator.handle(partial("late")).await;
        let summary = translator.finish();
        assert_eq!(summary.units_emitted, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_throttle_is_advisory_and_observer_is_drop_safe() {
        let (tx, mut rx) = mpsc::channel(4);
        let (obs_tx, obs_rx) = mpsc::channel(1);
        let mut translator = Translator::new(DeliveryMode::Incremental, tx).with_observer(obs_tx);

        let throttling = Throttling {
            max_num_user_messages_in_conversation: 5,
            num_user_messages_in_conversation: 2,
        };
        translator.handle(ProtocolEvent::ThrottleNotice(throttling)).await;
        translator.handle(ProtocolEvent::SearchQuery { query: "a".into() }).await;
        // observer buffer is full; this one is dropped rather than blocking
        translator.handle(ProtocolEvent::SearchQuery { query: "b".into() }).await;
        drop(obs_rx);
        translator.handle(ProtocolEvent::SearchResult { summary: "c".into() }).await;
        translator.handle(partial("Hi")).await;

        let summary = translator.finish();
        assert_eq!(summary.advisories, vec![throttling]);
        assert_eq!(rx.recv().await, Some(OutputUnit::Partial { text: "Hi".into() }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_run_consumes_until_sender_closes() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (ev_tx, ev_rx) = mpsc::channel(4);
        let translator = Translator::new(DeliveryMode::Batched, out_tx);

        ev_tx.send(partial("x")).await.unwrap();
        ev_tx.send(complete("x")).await.unwrap();
        drop(ev_tx);

        let summary = translator.run(ev_rx, &CancellationToken::new()).await;
        assert_eq!(summary.final_text.as_deref(), Some("x"));
        assert_eq!(summary.units_emitted, 1);
        assert!(matches!(out_rx.recv().await, Some(OutputUnit::Complete { .. })));
    }

    #[tokio::test]
    async fn test_run_stops_delivering_once_cancelled() {
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let translator = Translator::new(DeliveryMode::Incremental, out_tx);
        let cancel = CancellationToken::new();

        for text in ["A", "AB", "ABC"] {
            ev_tx.send(partial(text)).await.unwrap();
        }

        let trigger = cancel.clone();
        let run = translator.run(ev_rx, &cancel);
        let reader = async {
            // nothing is read until after the cancel, so "AB" is stuck waiting for space
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        };
        let (summary, ()) = tokio::join!(run, reader);
        drop(ev_tx);

        assert_eq!(summary.units_emitted, 1);
        assert_eq!(out_rx.recv().await, Some(OutputUnit::Partial { text: "A".into() }));
        assert_eq!(out_rx.recv().await, None);
    }
}
