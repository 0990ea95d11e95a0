//!
//! HTTP server implementation for the Bing Chat to OpenAI bridge.
//!
//! Handles incoming OpenAI-compatible requests, runs each one as a single turn
//! on a fresh upstream conversation and answers either with one completion
//! object or with a stream of Server-Sent Events. Every failure is rendered as
//! one structured error payload.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::bridge::{ChatBridge, TurnReport};
use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::config::Config;
use crate::converter::{BingToOpenAiConverter, DeltaTracker, OpenAiToBingConverter, ParsedChat};
use crate::error::{ProxyError, Result};
use crate::translator::{DeliveryMode, OutputUnit, Translator};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application state containing all dependencies.
pub struct AppState {
    /** application configuration */
    pub config: Config,
    /** bridge to the upstream chat service */
    pub bridge: Arc<ChatBridge>,
    /** converter from OpenAI requests to turns */
    pub request_converter: OpenAiToBingConverter,
    /** metrics for monitoring */
    pub metrics: AppMetrics,
}

///
/// Application metrics for monitoring and observability.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /** total number of requests processed */
    pub total_requests: AtomicU64,
    /** total number of successful requests */
    pub successful_requests: AtomicU64,
    /** total number of failed requests */
    pub failed_requests: AtomicU64,
    /** turns that ended by cancellation */
    pub cancelled_turns: AtomicU64,
    /** throttle notices and throttle failures seen */
    pub throttle_notices: AtomicU64,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Channel buffer size for streaming responses */
const STREAMING_CHANNEL_BUFFER: usize = 100;

/** Channel buffer size between translator and response writer */
const OUTPUT_CHANNEL_BUFFER: usize = 32;

/** Bearer token prefix */
const BEARER_PREFIX: &str = "Bearer ";

/** Plain-text liveness acknowledgment */
const LIVENESS_TEXT: &str = "BingMux is running";

/** Model names, one per conversation style */
const MODELS: [&str; 3] = ["creative", "balanced", "precise"];

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create new application state with all dependencies.
    ///
    /// # Arguments
    ///  * `config` - application configuration
    ///
    /// # Returns
    ///  * Application state; no upstream call is made yet
    ///  * `ProxyError` if the classifier overrides are invalid or the HTTP client
    ///    cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let classifier = Arc::new(ErrorClassifier::from_config(&config.classifier)?);
        let bridge = Arc::new(ChatBridge::new(&config.upstream, classifier)?);
        let request_converter = OpenAiToBingConverter::new(config.upstream.context_limit);

        Ok(Self { config, bridge, request_converter, metrics: AppMetrics::default() })
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn record_success(&self, report: &TurnReport) {
        self.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
        let notices = report.advisories.len() as u64;
        if notices > 0 {
            self.metrics.throttle_notices.fetch_add(notices, Ordering::Relaxed);
        }
    }

    fn record_failure(&self, error: &ProxyError) {
        self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
        match error {
            ProxyError::TurnCancelled => {
                self.metrics.cancelled_turns.fetch_add(1, Ordering::Relaxed);
            }
            e if e.kind().is_advisory() => {
                self.metrics.throttle_notices.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

///
/// Handle OpenAI-compatible chat completions endpoint.
///
/// # Arguments
///  * `state` - shared application state
///  * `headers` - request headers, checked for the bearer credential
///  * `body` - raw request body
///
/// # Returns
///  * HTTP response with OpenAI format completion, SSE stream or error
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let parsed = authorize(&state.config, &headers).and_then(|()| parse_request(&state, &body));
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            state.record_failure(&e);
            return create_error_response(&e);
        }
    };

    if state.config.streaming.mode.should_stream(parsed.stream) {
        handle_streaming_completion(state, parsed)
    } else {
        match handle_completion(&state, parsed).await {
            Ok(response) => response,
            Err(e) => {
                state.record_failure(&e);
                create_error_response(&e)
            }
        }
    }
}

///
/// Check the inbound bearer credential when one is configured.
///
/// # Returns
///  * `Ok(())` if no key is configured or the presented key matches
///  * `ProxyError::Auth` otherwise
fn authorize(config: &Config, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.server.api_key.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX));

    match presented {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ProxyError::Auth("Invalid API key".to_string())),
        None => Err(ProxyError::Auth("Missing bearer credential".to_string())),
    }
}

///
/// Parse the raw body into a turn.
fn parse_request(state: &AppState, body: &[u8]) -> Result<ParsedChat> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::Conversion(format!("Request body is not JSON: {}", e)))?;
    state.request_converter.parse(value)
}

///
/// Run a turn in batched mode and answer with one completion object.
///
/// # Arguments
///  * `state` - application state
///  * `parsed` - the parsed request
///
/// # Returns
///  * JSON completion response
///  * `ProxyError` from the bridge
async fn handle_completion(state: &Arc<AppState>, parsed: ParsedChat) -> Result<Response> {
    tracing::debug!("Using non-streaming mode");

    let (tx, mut rx) = mpsc::channel(OUTPUT_CHANNEL_BUFFER);
    let translator = Translator::new(DeliveryMode::Batched, tx);
    let cancel = CancellationToken::new();

    let report = state.bridge.ask(&parsed.turn, &cancel, translator).await?;
    state.record_success(&report);

    let (text, suggestions) = match rx.recv().await {
        Some(OutputUnit::Complete { text, suggestions }) => (text, suggestions),
        _ => (report.text, report.suggestions),
    };

    let completion = BingToOpenAiConverter::new(parsed.model).completion(text, suggestions);
    Ok(Json(completion).into_response())
}

///
/// Run a turn in incremental mode, answering with Server-Sent Events.
///
/// The turn runs on its own task; the response body is fed from a channel.
fn handle_streaming_completion(state: Arc<AppState>, parsed: ParsedChat) -> Response {
    tracing::debug!("Using streaming mode");

    let (tx, rx) = mpsc::channel::<Result<Event>>(STREAMING_CHANNEL_BUFFER);
    tokio::spawn(async move {
        process_streaming_turn(state, parsed, tx).await;
    });

    Sse::new(ReceiverStream::new(rx)).into_response()
}

///
/// Drive one streamed turn and forward its output as OpenAI chunks.
///
/// A failed write to the caller cancels the turn. A failed turn produces one
/// error event; chunks already sent stay sent. The stream always ends with
/// `[DONE]`.
///
/// # Arguments
///  * `state` - application state
///  * `parsed` - the parsed request
///  * `tx` - channel sender for streaming events
async fn process_streaming_turn(
    state: Arc<AppState>,
    parsed: ParsedChat,
    tx: mpsc::Sender<Result<Event>>,
) {
    let ParsedChat { turn, model, .. } = parsed;
    let converter = BingToOpenAiConverter::new(model);
    let cancel = CancellationToken::new();

    let (out_tx, mut out_rx) = mpsc::channel(OUTPUT_CHANNEL_BUFFER);
    let translator = Translator::new(DeliveryMode::Incremental, out_tx);
    let bridge = state.bridge.clone();
    let turn_cancel = cancel.clone();
    let turn_task =
        tokio::spawn(async move { bridge.ask(&turn, &turn_cancel, translator).await });

    let mut connected = send_json_event(&tx, &converter.role_chunk()).await;
    let mut tracker = DeltaTracker::new();
    while connected {
        // the caller may leave while the upstream is silent
        let unit = tokio::select! {
            biased;
            _ = tx.closed() => {
                connected = false;
                break;
            }
            unit = out_rx.recv() => unit,
        };
        let Some(unit) = unit else {
            break;
        };
        let text = match unit {
            OutputUnit::Partial { text } | OutputUnit::Complete { text, .. } => text,
        };
        if let Some(delta) = tracker.advance(&text) {
            connected = send_json_event(&tx, &converter.content_chunk(delta)).await;
        }
    }
    if !connected {
        tracing::debug!("Client went away; cancelling turn");
        cancel.cancel();
    }
    drop(out_rx);

    let outcome = match turn_task.await {
        Ok(outcome) => outcome,
        Err(e) => Err(ProxyError::Http(format!("Turn task failed: {}", e))),
    };

    match outcome {
        Ok(report) => {
            state.record_success(&report);
            send_json_event(&tx, &converter.stop_chunk()).await;
        }
        Err(e) => {
            tracing::error!("Streamed turn failed: {}", e);
            state.record_failure(&e);
            let (_, payload) = error_payload(&e);
            send_json_event(&tx, &payload).await;
        }
    }

    send_stream_done(&tx).await;
}

///
/// Send one JSON-encoded SSE event.
///
/// # Returns
///  * `false` once the caller has gone away
async fn send_json_event<T: Serialize>(tx: &mpsc::Sender<Result<Event>>, data: &T) -> bool {
    match serde_json::to_string(data) {
        Ok(data) => tx.send(Ok(Event::default().data(data))).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode stream event: {}", e);
            true
        }
    }
}

///
/// Send the final [DONE] event to complete the stream.
///
/// # Arguments
///  * `tx` - event sender channel
async fn send_stream_done(tx: &mpsc::Sender<Result<Event>>) {
    let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
}

///
/// Map an error to its HTTP status and JSON payload.
///
/// Core errors carry their taxonomy kind as `code`; request-side errors carry
/// their category.
///
/// # Returns
///  * status code and `{"error": {"code", "type", "message"}}`
pub fn error_payload(error: &ProxyError) -> (StatusCode, Value) {
    let (status_code, error_type) = match error {
        ProxyError::Config(_) | ProxyError::Conversion(_) | ProxyError::Serialization(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request_error")
        }
        ProxyError::Auth(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
        ProxyError::Http(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        ProxyError::TurnCancelled => (StatusCode::INTERNAL_SERVER_ERROR, "cancelled"),
        e => match e.kind() {
            ErrorKind::BingThrottleLimit | ErrorKind::ConversationLimit => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error")
            }
            _ => (StatusCode::BAD_GATEWAY, "upstream_error"),
        },
    };

    let code = if error.is_core() { error.kind().as_str() } else { error_type };

    let payload = json!({
      "error": {
        "code": code,
        "type": error_type,
        "message": error.to_string()
      }
    });

    (status_code, payload)
}

///
/// Create an error response for client errors.
///
/// # Arguments
///  * `error` - error to convert to HTTP response
///
/// # Returns
///  * HTTP error response with JSON error details
fn create_error_response(error: &ProxyError) -> Response {
    let (status_code, payload) = error_payload(error);
    (status_code, Json(payload)).into_response()
}

///
/// Plain-text liveness acknowledgment.
pub async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

///
/// Empty acknowledgment for `OPTIONS` requests.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

///
/// Handle models listing endpoint for OpenAI compatibility.
///
/// # Returns
///  * JSON response with one model per conversation style
pub async fn models() -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = MODELS
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": created, "owned_by": "bing"}))
        .collect();

    Json(json!({ "object": "list", "data": data }))
}

///
/// Handle health check endpoint.
///
/// Reports basic metrics and whether an upstream session is held; token
/// values are never included.
///
/// # Arguments
///  * `state` - shared application state with metrics
///
/// # Returns
///  * JSON response with health status and metrics
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let total_requests = state.metrics.total_requests.load(Ordering::Relaxed);
    let successful_requests = state.metrics.successful_requests.load(Ordering::Relaxed);
    let failed_requests = state.metrics.failed_requests.load(Ordering::Relaxed);
    let cancelled_turns = state.metrics.cancelled_turns.load(Ordering::Relaxed);
    let throttle_notices = state.metrics.throttle_notices.load(Ordering::Relaxed);

    let session = state.bridge.session().current().await;
    let session = match session {
        Some(session) => json!({
          "acquired": true,
          "acquired_at": session.acquired_at().to_rfc3339(),
          "tokens": session.token_names()
        }),
        None => json!({ "acquired": false }),
    };

    Json(json!({
      "status": "ok",
      "session": session,
      "metrics": {
        "total_requests": total_requests,
        "successful_requests": successful_requests,
        "failed_requests": failed_requests,
        "cancelled_turns": cancelled_turns,
        "throttle_notices": throttle_notices,
        "success_rate": if total_requests > 0 {
          (successful_requests as f64 / total_requests as f64 * 100.0).round()
        } else {
          100.0
        }
      }
    }))
}
