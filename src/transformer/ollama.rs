//! Ollama `/api/generate` streaming.

use super::{decode_records, Decoded, RecordFramer, StreamDecoder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// One NDJSON line of a generate stream.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaGenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoder for generate NDJSON. The stream ends only when the connection closes.
pub struct GenerateDecoder {
    framer: RecordFramer,
}

impl GenerateDecoder {
    pub fn new() -> Self {
        Self {
            framer: RecordFramer::ndjson(),
        }
    }
}

impl Default for GenerateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<OllamaGenerateChunk>(payload) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                tracing::warn!(error = %error, "Ollama reported an error mid-stream");
                return None;
            }
            chunk.response
        }
        Err(e) => {
            tracing::warn!(error = %e, payload = %payload, "Failed to parse Ollama chunk");
            None
        }
    }
}

impl StreamDecoder for GenerateDecoder {
    fn decode(&mut self, frame: &[u8]) -> Decoded {
        decode_records(self.framer.push(frame), extract_text)
    }

    fn finish(&mut self) -> Vec<String> {
        decode_records(self.framer.finish(), extract_text).increments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_response_lines() {
        let mut decoder = GenerateDecoder::new();
        let decoded = decoder.decode(
            "{\"model\":\"m\",\"response\":\"Χαῖρε\",\"done\":false}\n{\"response\":\"!\",\"done\":false}\n"
                .as_bytes(),
        );
        assert_eq!(decoded.increments, vec!["Χαῖρε".to_string(), "!".to_string()]);
        assert!(!decoded.terminal);
    }

    #[test]
    fn test_done_record_is_not_terminal() {
        let mut decoder = GenerateDecoder::new();
        let decoded = decoder.decode(b"{\"response\":\"\",\"done\":true}\n");
        assert!(decoded.increments.is_empty());
        assert!(!decoded.terminal);
    }

    #[test]
    fn test_error_record_dropped() {
        let mut decoder = GenerateDecoder::new();
        let decoded = decoder.decode(b"{\"error\":\"model not found\"}\n{\"response\":\"a\"}\n");
        assert_eq!(decoded.increments, vec!["a".to_string()]);
    }

    #[test]
    fn test_blank_lines_and_garbage_skipped() {
        let mut decoder = GenerateDecoder::new();
        let decoded = decoder.decode(b"\n\n{oops\n{\"response\":\"b\"}\n");
        assert_eq!(decoded.increments, vec!["b".to_string()]);
    }
}
