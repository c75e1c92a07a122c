//! OpenAI-compatible chat completions.
//!
//! Request types for `/chat/completions` and the decoder for its SSE stream.
//! DeepSeek speaks the same dialect.

use super::{decode_records, Decoded, RecordFramer, StreamDecoder};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl OpenAIMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Streaming chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
}

// ============================================================================
// Stream Types
// ============================================================================

/// Streaming chunk. Only the fields the decoder reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChoice {
    #[serde(default)]
    pub delta: Option<OpenAIDelta>,
    /// Legacy completion-style text
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl OpenAIStreamChunk {
    /// `choices[0].delta.content`, falling back to `choices[0].text`.
    pub fn text(&self) -> Option<&str> {
        let choice = self.choices.first()?;
        choice
            .delta
            .as_ref()
            .and_then(|d| d.content.as_deref())
            .filter(|c| !c.is_empty())
            .or(choice.text.as_deref())
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decoder for chat completion event streams.
pub struct ChatCompletionsDecoder {
    framer: RecordFramer,
}

impl ChatCompletionsDecoder {
    pub fn new() -> Self {
        Self {
            framer: RecordFramer::sse(),
        }
    }
}

impl Default for ChatCompletionsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<OpenAIStreamChunk>(payload) {
        Ok(chunk) => chunk.text().map(|t| t.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, payload = %payload, "Failed to parse chat completion chunk");
            None
        }
    }
}

impl StreamDecoder for ChatCompletionsDecoder {
    fn decode(&mut self, frame: &[u8]) -> Decoded {
        decode_records(self.framer.push(frame), extract_text)
    }

    fn finish(&mut self) -> Vec<String> {
        decode_records(self.framer.finish(), extract_text).increments
    }
}
