//! Record framing for byte-oriented provider streams.
//!
//! Upstream reads arrive at arbitrary boundaries, including in the middle of
//! a multi-byte UTF-8 sequence. [`RecordFramer`] keeps the unterminated tail
//! of each read as carry-over and only decodes complete lines, so Greek text
//! split across reads is reassembled before it is interpreted.

/// One complete record extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Record payload with framing (`data:` prefix, trailing `\r`) removed.
    Data(String),
    /// The provider's explicit end-of-stream marker.
    EndMarker,
}

/// Line-oriented framer shared by the SSE and NDJSON decoders.
#[derive(Debug, Clone)]
pub struct RecordFramer {
    buffer: Vec<u8>,
    sse: bool,
    end_marker: Option<&'static str>,
    ended: bool,
}

/// SSE end marker used by chat-completion and token event streams.
pub const SSE_DONE: &str = "[DONE]";

impl RecordFramer {
    /// Newline-delimited JSON: every non-blank line is one record.
    pub fn ndjson() -> Self {
        Self {
            buffer: Vec::new(),
            sse: false,
            end_marker: None,
            ended: false,
        }
    }

    /// Server-sent events: `data:` payloads, comments and field lines skipped,
    /// `[DONE]` ends the stream.
    pub fn sse() -> Self {
        Self {
            buffer: Vec::new(),
            sse: true,
            end_marker: Some(SSE_DONE),
            ended: false,
        }
    }

    /// Append one upstream read and return every record it completed.
    pub fn push(&mut self, frame: &[u8]) -> Vec<Record> {
        if self.ended {
            return Vec::new();
        }
        self.buffer.extend_from_slice(frame);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(record) = self.interpret(&self.buffer[start..end]) {
                let is_end = record == Record::EndMarker;
                records.push(record);
                if is_end {
                    self.ended = true;
                    self.buffer.clear();
                    return records;
                }
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        records
    }

    /// Decode whatever unterminated fragment remains at connection close.
    pub fn finish(&mut self) -> Vec<Record> {
        if self.ended || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let tail = std::mem::take(&mut self.buffer);
        self.ended = true;
        self.interpret(&tail).into_iter().collect()
    }

    /// Bytes held back waiting for a line terminator.
    pub fn carry_over(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn interpret(&self, raw: &[u8]) -> Option<Record> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, bytes = raw.len(), "Dropping record with invalid UTF-8");
                return None;
            }
        };

        if line.trim().is_empty() {
            return None;
        }

        let payload = if self.sse {
            if line.starts_with(':') {
                return None;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                rest.strip_prefix(' ').unwrap_or(rest)
            } else if is_sse_field(line) {
                return None;
            } else {
                line
            }
        } else {
            line
        };

        if self.end_marker.is_some_and(|marker| payload.trim() == marker) {
            return Some(Record::EndMarker);
        }

        Some(Record::Data(payload.to_string()))
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}
