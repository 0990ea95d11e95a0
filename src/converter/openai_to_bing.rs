//!
//! OpenAI to Bing request conversion.
//!
//! Turns an OpenAI-compatible chat completion request into a single
//! [`TurnRequest`]: the last message becomes the prompt, earlier messages are
//! condensed into a bounded context block, and the model name selects the
//! conversation style.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::Deserialize;

use crate::error::{ProxyError, Result};
use crate::protocol::{ConversationStyle, TurnRequest};

/* --- types ----------------------------------------------------------------------------------- */

///
/// OpenAI chat completion request structure.
///
/// Only the fields the bridge acts on are modelled; sampling parameters and
/// tool definitions are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /** model identifier; also selects the conversation style */
    pub model: Option<String>,
    /** conversation messages, oldest first */
    pub messages: Vec<ChatMessage>,
    /** whether the caller asked for a streamed response */
    pub stream: Option<bool>,
}

///
/// One role-tagged message of the request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    /** message role: system, user, assistant, ... */
    pub role: String,
    /** message content; may be absent */
    #[serde(default)]
    pub content: Option<MessageContent>,
}

///
/// Message content: a plain string or an array of typed parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

///
/// One typed content part; only `text` parts contribute.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: Option<String>,
}

///
/// A parsed request ready for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChat {
    /** the turn to send upstream */
    pub turn: TurnRequest,
    /** model name echoed back in responses */
    pub model: String,
    /** the caller's `stream` flag, if given */
    pub stream: Option<bool>,
}

///
/// Converter from OpenAI requests to Bing turns.
#[derive(Debug, Clone)]
pub struct OpenAiToBingConverter {
    /** bound on the condensed context, in characters */
    context_limit: usize,
}

/* --- constants ------------------------------------------------------------------------------ */

/** model name reported when the request names none */
pub const DEFAULT_MODEL: &str = "creative";

/* --- start of code -------------------------------------------------------------------------- */

impl MessageContent {
    /// Flatten to plain text; text parts are joined by newlines
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.part_type == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl ChatMessage {
    pub fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::as_text).unwrap_or_default()
    }
}

impl OpenAiToBingConverter {
    ///
    /// Create a converter.
    ///
    /// # Arguments
    ///  * `context_limit` - bound on the condensed prior-message context
    pub fn new(context_limit: usize) -> Self {
        Self { context_limit }
    }

    ///
    /// Parse a raw JSON request body.
    ///
    /// # Returns
    ///  * the parsed chat
    ///  * `ProxyError::Conversion` if the body does not match the request schema
    ///    or carries no prompt
    pub fn parse(&self, body: serde_json::Value) -> Result<ParsedChat> {
        let request: ChatCompletionRequest = serde_json::from_value(body)
            .map_err(|e| ProxyError::Conversion(format!("Invalid request format: {}", e)))?;
        self.convert(request)
    }

    ///
    /// Convert a request into a turn.
    ///
    /// # Arguments
    ///  * `request` - the OpenAI request
    ///
    /// # Returns
    ///  * the parsed chat
    ///  * `ProxyError::Conversion` if the last message is missing or empty
    pub fn convert(&self, request: ChatCompletionRequest) -> Result<ParsedChat> {
        let ChatCompletionRequest { model, mut messages, stream } = request;

        let prompt = messages
            .pop()
            .map(|m| m.text())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProxyError::Conversion("Prompt is required".to_string()))?;

        let model = model.filter(|m| !m.is_empty()).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let style = ConversationStyle::from_model(&model);
        let context = message_to_context(&messages, self.context_limit);

        tracing::debug!(
            "Parsed request: model={}, style={}, history={} message(s), context={} chars",
            model,
            style.as_str(),
            messages.len(),
            context.chars().count()
        );

        Ok(ParsedChat {
            turn: TurnRequest::new(prompt).with_context(context).with_style(style),
            model,
            stream,
        })
    }
}

impl Default for OpenAiToBingConverter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONTEXT_LIMIT)
    }
}

///
/// Condense prior messages into a bounded context block.
///
/// Walks the history newest first, rendering each message as
/// `[role](#message)\n<content>\n`, and stops before the running length would
/// reach `limit`. Kept blocks are joined by a newline in chronological order.
///
/// # Arguments
///  * `messages` - prior messages, oldest first
///  * `limit` - exclusive bound on the accumulated length, in characters
///
/// # Returns
///  * the context text; empty when nothing fits
pub fn message_to_context(messages: &[ChatMessage], limit: usize) -> String {
    let mut kept = Vec::new();
    let mut length = 0;

    for message in messages.iter().rev() {
        let block = format!("[{}](#message)\n{}\n", message.role, message.text().trim());
        let block_length = block.chars().count();
        if length + block_length >= limit {
            break;
        }
        length += block_length + 1;
        kept.push(block);
    }

    kept.reverse();
    kept.join("\n")
}
