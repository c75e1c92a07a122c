//! Gemini `streamGenerateContent`.
//!
//! Gemini is consumed through a native client that yields already-decoded
//! text chunks ([`crate::services::gemini_client`]). The types here describe
//! its wire format; [`GeneratorDecoder`] passes each yielded chunk through.

use super::{Decoded, StreamDecoder};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerateRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
}

impl GeminiGenerateRequest {
    /// Single-turn request carrying one user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.into()),
                }],
            }],
            system_instruction: None,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
}

/// One streamed `GenerateContentResponse`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiStreamChunk {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

impl GeminiStreamChunk {
    /// Concatenated text of the first candidate's parts.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Pass-through decoder: each frame is one decoded text chunk.
#[derive(Default)]
pub struct GeneratorDecoder;

impl GeneratorDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl StreamDecoder for GeneratorDecoder {
    fn decode(&mut self, frame: &[u8]) -> Decoded {
        let mut decoded = Decoded::default();
        match std::str::from_utf8(frame) {
            Ok(text) => decoded.push(text),
            Err(e) => {
                tracing::warn!(error = %e, "Generator chunk is not valid UTF-8");
                decoded.push(String::from_utf8_lossy(frame).into_owned());
            }
        }
        decoded
    }

    fn finish(&mut self) -> Vec<String> {
        Vec::new()
    }
}
