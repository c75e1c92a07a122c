//! text-generation-inference `/generate_stream`.

use super::{decode_records, Decoded, RecordFramer, StreamDecoder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgiParameters {
    pub max_new_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgiGenerateRequest {
    pub inputs: String,
    pub parameters: TgiParameters,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgiToken {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub special: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgiStreamEvent {
    pub token: Option<TgiToken>,
    #[serde(default)]
    pub generated_text: Option<String>,
}

/// Decoder for token event streams.
pub struct TokenEventDecoder {
    framer: RecordFramer,
}

impl TokenEventDecoder {
    pub fn new() -> Self {
        Self {
            framer: RecordFramer::sse(),
        }
    }
}

impl Default for TokenEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<TgiStreamEvent>(payload) {
        Ok(event) => event.token.filter(|t| !t.special).map(|t| t.text),
        Err(e) => {
            tracing::warn!(error = %e, payload = %payload, "Failed to parse TGI token event");
            None
        }
    }
}

impl StreamDecoder for TokenEventDecoder {
    fn decode(&mut self, frame: &[u8]) -> Decoded {
        decode_records(self.framer.push(frame), extract_text)
    }

    fn finish(&mut self) -> Vec<String> {
        decode_records(self.framer.finish(), extract_text).increments
    }
}
