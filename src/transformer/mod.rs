//! Provider stream decoders.
//!
//! Every upstream speaks its own streaming dialect. A [`StreamDecoder`] turns
//! the raw frames of one upstream connection into plain text increments and
//! reports when the provider signalled the end of the stream:
//!
//! ```text
//! upstream frames ──> [RecordFramer] ──> records ──> [decoder] ──> increments
//!                      (carry-over)                  (per dialect)
//! ```
//!
//! The generator dialect skips framing entirely: its frames are already
//! decoded text chunks produced by a native client.

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stream;
pub mod tgi;

pub use gemini::GeneratorDecoder;
pub use ollama::GenerateDecoder;
pub use openai::ChatCompletionsDecoder;
pub use stream::{Record, RecordFramer};
pub use tgi::TokenEventDecoder;

/// Output of decoding one upstream frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Text increments in upstream order. Never contains empty strings.
    pub increments: Vec<String>,
    /// The provider's end marker was seen; nothing after it is decoded.
    pub terminal: bool,
}

impl Decoded {
    pub fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.increments.push(text);
        }
    }
}

/// Incremental decoder for one upstream connection.
pub trait StreamDecoder: Send {
    /// Consume one raw frame.
    fn decode(&mut self, frame: &[u8]) -> Decoded;

    /// Flush buffered state at connection close.
    fn finish(&mut self) -> Vec<String>;
}

/// Streaming dialect spoken by an upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// OpenAI-style chat completion SSE (`choices[0].delta.content`, `[DONE]`)
    ChatCompletions,
    /// Ollama `/api/generate` NDJSON (`response`)
    GenerateNdjson,
    /// text-generation-inference SSE (`token.text`, `[DONE]`)
    TokenEvents,
    /// Already-decoded text chunks from a native client
    Generator,
}

impl WireFormat {
    pub fn decoder(self) -> Box<dyn StreamDecoder> {
        match self {
            WireFormat::ChatCompletions => Box::new(ChatCompletionsDecoder::new()),
            WireFormat::GenerateNdjson => Box::new(GenerateDecoder::new()),
            WireFormat::TokenEvents => Box::new(TokenEventDecoder::new()),
            WireFormat::Generator => Box::new(GeneratorDecoder::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireFormat::ChatCompletions => "chat-completions-sse",
            WireFormat::GenerateNdjson => "generate-ndjson",
            WireFormat::TokenEvents => "token-sse",
            WireFormat::Generator => "generator",
        }
    }
}

/// Run a framed decoder over complete records, stopping at the end marker.
pub(crate) fn decode_records<F>(records: Vec<Record>, mut extract: F) -> Decoded
where
    F: FnMut(&str) -> Option<String>,
{
    let mut decoded = Decoded::default();
    for record in records {
        match record {
            Record::Data(payload) => {
                if let Some(text) = extract(&payload) {
                    decoded.push(text);
                }
            }
            Record::EndMarker => {
                decoded.terminal = true;
                break;
            }
        }
    }
    decoded
}

/// Decode a whole frame sequence at once. Used by tests and benchmarks.
pub fn decode_all<'a, I>(format: WireFormat, frames: I) -> (Vec<String>, bool)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = format.decoder();
    let mut increments = Vec::new();
    for frame in frames {
        let decoded = decoder.decode(frame);
        increments.extend(decoded.increments);
        if decoded.terminal {
            return (increments, true);
        }
    }
    increments.extend(decoder.finish());
    (increments, false)
}
