//!
//! ChatHub wire protocol: outbound frame builders and inbound frame decoding.
//!
//! The duplex endpoint speaks a SignalR-style JSON protocol in which every
//! frame is terminated by the ASCII record separator. A turn consists of a
//! version handshake, a keep-alive declaration and a single invocation frame;
//! the upstream answers with a series of update frames (type 1) and one
//! end-of-turn frame (type 2).
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod machine;
pub mod transport;

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::conversation::ConversationContext;
use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** terminator appended to every frame on the wire */
pub const RECORD_SEPARATOR: char = '\u{1e}';

/** option sets sent with every turn regardless of style */
const BASE_OPTION_SETS: [&str; 7] = [
    "nlu_direct_response_filter",
    "deepleo",
    "enable_debug_commands",
    "disable_emoji_spoken_text",
    "responsible_ai_policy_235",
    "enablemm",
    "dv3sugg",
];

/** message types the upstream is allowed to send back */
const ALLOWED_MESSAGE_TYPES: [&str; 2] = ["Chat", "InternalSearchQuery"];

/** fixed identifier of the injected prior-context message */
const CONTEXT_MESSAGE_ID: &str = "discover-web--page-ping-mriduna-----";

const FRAME_TYPE_UPDATE: u8 = 1;
const FRAME_TYPE_END: u8 = 2;
const FRAME_TYPE_INVOCATION: u8 = 4;
const FRAME_TYPE_CLOSE: u8 = 7;

const MESSAGE_TYPE_CHAT: &str = "Chat";
const MESSAGE_TYPE_SEARCH_QUERY: &str = "InternalSearchQuery";
const MESSAGE_TYPE_SEARCH_RESULT: &str = "InternalSearchResult";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Response style selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    #[default]
    Creative,
    Balanced,
    Precise,
}

///
/// One caller turn, built fresh and never mutated after send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /** the prompt text */
    pub prompt: String,
    /** condensed prior conversation, if any */
    pub context: Option<String>,
    /** response style */
    pub style: ConversationStyle,
}

///
/// Semantic event produced by the turn state machine.
///
/// `PartialAnswer` carries the cumulative answer text, not a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    PartialAnswer { text: String },
    SearchQuery { query: String },
    SearchResult { summary: String },
    Suggestions(Vec<String>),
    ThrottleNotice(Throttling),
    TurnComplete { text: String },
}

///
/// Per-conversation message budget reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Throttling {
    #[serde(deserialize_with = "null_as_default")]
    pub max_num_user_messages_in_conversation: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub num_user_messages_in_conversation: u32,
}

///
/// Raw inbound frame.
///
/// Only the fields the bridge acts on are modelled; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /** frame type; absent on the handshake acknowledgement */
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    /** arguments of an update frame */
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: Vec<UpdateArguments>,
    /** result payload of an end-of-turn frame */
    pub item: Option<TurnItem>,
    /** error text of a close or completion frame */
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArguments {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatMessage>,
    pub throttling: Option<Throttling>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatMessage>,
    pub result: Option<TurnResult>,
    pub throttling: Option<Throttling>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub value: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: Option<String>,
    pub hidden_text: Option<String>,
    pub author: Option<String>,
    pub message_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggested_responses: Vec<SuggestedResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestedResponse {
    pub text: Option<String>,
}

///
/// What the state machine should do with one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// Handshake acks, pings, invocation completions and unknown types
    Ignore,
    /// In-progress update carrying zero or more events
    Update(Vec<ProtocolEvent>),
    /// End of turn
    End {
        events: Vec<ProtocolEvent>,
        final_text: Option<String>,
        result_code: Option<String>,
        result_message: Option<String>,
    },
    /// Upstream closed the invocation
    Close { error: Option<String> },
}

/* --- outbound wire types --------------------------------------------------------------------- */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvocationFrame<'a> {
    arguments: [InvocationArguments<'a>; 1],
    invocation_id: String,
    target: &'static str,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvocationArguments<'a> {
    source: &'static str,
    options_sets: Vec<&'static str>,
    allowed_message_types: [&'static str; 2],
    slice_ids: [&'static str; 0],
    trace_id: &'a str,
    is_start_of_session: bool,
    message: OutboundMessage<'a>,
    conversation_signature: &'a str,
    participant: Participant<'a>,
    conversation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_messages: Option<[ContextMessage<'a>; 1]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMessage<'a> {
    author: &'static str,
    input_method: &'static str,
    text: &'a str,
    message_type: &'static str,
}

#[derive(Serialize)]
struct Participant<'a> {
    id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextMessage<'a> {
    author: &'static str,
    description: &'a str,
    context_type: &'static str,
    message_type: &'static str,
    message_id: &'static str,
}

/* --- start of code -------------------------------------------------------------------------- */

impl ConversationStyle {
    ///
    /// Pick a style from a caller-supplied model name.
    ///
    /// Names containing `precise` or `balanced` select those styles; anything
    /// else (including no model) is creative.
    pub fn from_model(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.contains("precise") {
            ConversationStyle::Precise
        } else if model.contains("balanced") {
            ConversationStyle::Balanced
        } else {
            ConversationStyle::Creative
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStyle::Creative => "creative",
            ConversationStyle::Balanced => "balanced",
            ConversationStyle::Precise => "precise",
        }
    }

    ///
    /// Option sets for a turn in this style: the base sets plus the style's own.
    pub fn option_sets(self) -> Vec<&'static str> {
        let style_set = match self {
            ConversationStyle::Creative => "h3imaginative",
            ConversationStyle::Balanced => "galileo",
            ConversationStyle::Precise => "h3precise",
        };
        let mut sets = BASE_OPTION_SETS.to_vec();
        sets.push(style_set);
        sets
    }
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), context: None, style: ConversationStyle::default() }
    }

    /// Attach prior context; blank context is dropped
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() { None } else { Some(context) };
        self
    }

    pub fn with_style(mut self, style: ConversationStyle) -> Self {
        self.style = style;
        self
    }
}

impl Throttling {
    ///
    /// Whether the conversation has used up its message budget.
    ///
    /// A zero maximum means the upstream did not report a budget.
    pub fn is_exhausted(&self) -> bool {
        self.max_num_user_messages_in_conversation > 0
            && self.num_user_messages_in_conversation >= self.max_num_user_messages_in_conversation
    }
}

impl ChatMessage {
    fn is_from_user(&self) -> bool {
        self.author.as_deref() == Some("user")
    }

    ///
    /// Effective message type; bot messages without one are chat.
    fn effective_type(&self) -> Option<&str> {
        match self.message_type.as_deref() {
            Some(kind) => Some(kind),
            None if !self.is_from_user() => Some(MESSAGE_TYPE_CHAT),
            None => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        self.suggested_responses.iter().filter_map(|s| s.text.clone()).collect()
    }

    ///
    /// Map one message to the events it yields, in order.
    fn events(&self, out: &mut Vec<ProtocolEvent>) {
        if self.is_from_user() {
            return;
        }
        match self.effective_type() {
            Some(MESSAGE_TYPE_SEARCH_QUERY) => {
                let query = self.hidden_text.clone().or_else(|| self.text.clone());
                out.push(ProtocolEvent::SearchQuery { query: query.unwrap_or_default() });
            }
            Some(MESSAGE_TYPE_SEARCH_RESULT) => {
                let summary = self.text.clone().or_else(|| self.hidden_text.clone());
                out.push(ProtocolEvent::SearchResult { summary: summary.unwrap_or_default() });
            }
            Some(MESSAGE_TYPE_CHAT) => {
                if let Some(text) = &self.text {
                    out.push(ProtocolEvent::PartialAnswer { text: text.clone() });
                }
                let suggestions = self.suggestions();
                if !suggestions.is_empty() {
                    out.push(ProtocolEvent::Suggestions(suggestions));
                }
            }
            _ => {}
        }
    }
}

impl InboundFrame {
    ///
    /// Interpret this frame for the turn state machine.
    pub fn action(&self) -> FrameAction {
        match self.kind {
            Some(FRAME_TYPE_UPDATE) => {
                let mut events = Vec::new();
                for args in &self.arguments {
                    for message in &args.messages {
                        message.events(&mut events);
                    }
                    if let Some(throttling) = args.throttling {
                        events.push(ProtocolEvent::ThrottleNotice(throttling));
                    }
                }
                FrameAction::Update(events)
            }
            Some(FRAME_TYPE_END) => {
                let item = self.item.clone().unwrap_or_default();
                let mut events = Vec::new();
                if let Some(throttling) = item.throttling {
                    events.push(ProtocolEvent::ThrottleNotice(throttling));
                }
                let final_message = item
                    .messages
                    .iter()
                    .rev()
                    .find(|m| !m.is_from_user() && m.effective_type() == Some(MESSAGE_TYPE_CHAT));
                if let Some(message) = final_message {
                    let suggestions = message.suggestions();
                    if !suggestions.is_empty() {
                        events.push(ProtocolEvent::Suggestions(suggestions));
                    }
                }
                let final_text = final_message.and_then(|m| m.text.clone());
                let (result_code, result_message) = match item.result {
                    Some(result) => (result.value, result.message),
                    None => (None, None),
                };
                FrameAction::End { events, final_text, result_code, result_message }
            }
            Some(FRAME_TYPE_CLOSE) => FrameAction::Close { error: self.error.clone() },
            _ => FrameAction::Ignore,
        }
    }
}

///
/// Split raw inbound text into frames and decode each one.
///
/// # Arguments
///  * `raw` - one transport message, possibly holding several frames
///
/// # Returns
///  * decoded frames in wire order
///  * `ProxyError::ProtocolDesync` if any frame is not valid JSON
pub fn decode_frames(raw: &str) -> Result<Vec<InboundFrame>> {
    raw.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            serde_json::from_str::<InboundFrame>(part).map_err(|e| {
                ProxyError::ProtocolDesync(format!("undecodable frame ({}): {}", e, preview(part)))
            })
        })
        .collect()
}

/// Protocol-version handshake frame
pub fn handshake_frame() -> String {
    terminate(r#"{"protocol":"json","version":1}"#.to_string())
}

/// Keep-alive declaration frame
pub fn keepalive_frame() -> String {
    terminate(r#"{"type":6}"#.to_string())
}

///
/// Build the invocation frame for one turn.
///
/// # Arguments
///  * `context` - the conversation the turn belongs to
///  * `request` - the turn request
///  * `trace_id` - per-turn trace token
///
/// # Returns
///  * the terminated frame text
///  * `ProxyError::Serialization` if encoding fails
pub fn turn_frame(
    context: &ConversationContext,
    request: &TurnRequest,
    trace_id: &str,
) -> Result<String> {
    let previous_messages = request.context.as_deref().map(|description| {
        [ContextMessage {
            author: "user",
            description,
            context_type: "WebPage",
            message_type: "Context",
            message_id: CONTEXT_MESSAGE_ID,
        }]
    });

    let frame = InvocationFrame {
        arguments: [InvocationArguments {
            source: "cib",
            options_sets: request.style.option_sets(),
            allowed_message_types: ALLOWED_MESSAGE_TYPES,
            slice_ids: [],
            trace_id,
            is_start_of_session: context.is_start_of_session(),
            message: OutboundMessage {
                author: "user",
                input_method: "Keyboard",
                text: &request.prompt,
                message_type: MESSAGE_TYPE_CHAT,
            },
            conversation_signature: context.signature(),
            participant: Participant { id: context.client_id() },
            conversation_id: context.conversation_id(),
            previous_messages,
        }],
        invocation_id: context.turn().to_string(),
        target: "chat",
        kind: FRAME_TYPE_INVOCATION,
    };

    Ok(terminate(serde_json::to_string(&frame)?))
}

///
/// Fresh per-turn trace token: 32 lowercase hex digits of a random UUID.
pub fn new_trace_token() -> String {
    trace_token(Uuid::new_v4())
}

/// Fixed-width trace token derived from a UUID
pub fn trace_token(id: Uuid) -> String {
    id.simple().to_string()
}

fn terminate(mut frame: String) -> String {
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn preview(part: &str) -> String {
    part.chars().take(80).collect()
}
