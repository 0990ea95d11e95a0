//!
//! Bing to OpenAI response conversion.
//!
//! Renders the bridge's output units as OpenAI chat completion objects and
//! streaming chunks. Upstream partial answers are cumulative, so streamed
//! chunks carry only the new suffix, tracked by [`DeltaTracker`].
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::Serialize;
use uuid::Uuid;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Non-streaming chat completion response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    /** follow-up suggestions from the upstream; omitted when empty */
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_responses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

///
/// One streamed chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    /** `null` until the final chunk */
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

///
/// Builds the responses of one completion; every object shares one id.
#[derive(Debug, Clone)]
pub struct BingToOpenAiConverter {
    /** completion id, `chatcmpl-` plus 32 hex digits */
    id: String,
    /** model name echoed back */
    model: String,
    /** creation time, seconds since the epoch */
    created: i64,
}

///
/// Turns cumulative answer text into suffix deltas.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    /** cumulative text already delivered */
    sent: String,
}

/* --- constants ------------------------------------------------------------------------------ */

const ASSISTANT_ROLE: &str = "assistant";
const FINISH_STOP: &str = "stop";

/* --- start of code -------------------------------------------------------------------------- */

impl BingToOpenAiConverter {
    ///
    /// Start a completion for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    ///
    /// Render a complete answer.
    ///
    /// # Arguments
    ///  * `text` - final answer text
    ///  * `suggestions` - follow-up suggestions, possibly empty
    pub fn completion(&self, text: String, suggestions: Vec<String>) -> ChatCompletion {
        ChatCompletion {
            id: self.id.clone(),
            object: "chat.completion",
            created: self.created,
            model: self.model.clone(),
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage { role: ASSISTANT_ROLE, content: text },
                finish_reason: FINISH_STOP,
            }],
            suggested_responses: suggestions,
        }
    }

    /// First chunk of a stream, announcing the assistant role
    pub fn role_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta { role: Some(ASSISTANT_ROLE), content: None }, None)
    }

    /// Chunk carrying a piece of new text
    pub fn content_chunk(&self, delta: String) -> ChatCompletionChunk {
        self.chunk(ChunkDelta { role: None, content: Some(delta) }, None)
    }

    /// Last chunk of a stream
    pub fn stop_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some(FINISH_STOP))
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<&'static str>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
        }
    }
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Accept the next cumulative text.
    ///
    /// When the upstream rewrites earlier text instead of extending it, the
    /// part after the longest common prefix is sent again; delivered text is
    /// never retracted.
    ///
    /// # Arguments
    ///  * `cumulative` - answer text observed so far
    ///
    /// # Returns
    ///  * the text to send, or `None` if nothing new arrived
    pub fn advance(&mut self, cumulative: &str) -> Option<String> {
        let common = common_prefix_len(&self.sent, cumulative);
        let delta = &cumulative[common..];
        let delta = if delta.is_empty() { None } else { Some(delta.to_string()) };
        self.sent = cumulative.to_string();
        delta
    }

    /// Cumulative text delivered so far
    pub fn sent(&self) -> &str {
        &self.sent
    }
}

/// Byte length of the longest common prefix, on a char boundary
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((index, _), _)| index)
        .unwrap_or_else(|| a.len().min(b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_shape() {
        let converter = BingToOpenAiConverter::new("creative");
        let value = serde_json::to_value(converter.completion("Hi there".into(), vec![])).unwrap();

        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["model"], "creative");
        let message = json!({"role": "assistant", "content": "Hi there"});
        assert_eq!(value["choices"][0]["message"], message);
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert!(value.get("suggested_responses").is_none());
        assert!(value["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }

    #[test]
    fn test_suggestions_are_attached() {
        let converter = BingToOpenAiConverter::new("m");
        let completion = converter.completion("a".into(), vec!["Tell me more".into()]);
        let value = serde_json::to_value(completion).unwrap();
        assert_eq!(value["suggested_responses"], json!(["Tell me more"]));
    }

    #[test]
    fn test_chunks_share_id() {
        let converter = BingToOpenAiConverter::new("m");
        let role = serde_json::to_value(converter.role_chunk()).unwrap();
        let content = serde_json::to_value(converter.content_chunk("Hi".into())).unwrap();
        let stop = serde_json::to_value(converter.stop_chunk()).unwrap();

        assert_eq!(role["id"], content["id"]);
        assert_eq!(role["choices"][0]["delta"], json!({"role": "assistant"}));
        assert_eq!(content["choices"][0]["delta"], json!({"content": "Hi"}));
        assert!(content["choices"][0]["finish_reason"].is_null());
        assert_eq!(stop["choices"][0]["delta"], json!({}));
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_delta_tracker_emits_suffixes() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.advance("Hi").as_deref(), Some("Hi"));
        assert_eq!(tracker.advance("Hi there").as_deref(), Some(" there"));
        assert_eq!(tracker.advance("Hi there"), None);
        assert_eq!(tracker.sent(), "Hi there");
    }

    #[test]
    fn test_delta_tracker_handles_rewrites() {
        let mut tracker = DeltaTracker::new();
        tracker.advance("Hello wörld");
        assert_eq!(tracker.advance("Hello wörk").as_deref(), Some("k"));
        assert_eq!(tracker.advance("Hello"), None);
        assert_eq!(tracker.advance("Hello, ünïcode").as_deref(), Some(", ünïcode"));
    }
}
