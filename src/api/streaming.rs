//! Stream normalization: provider frames in, NDJSON increments out.
//!
//! The normalizer is pull-based. An upstream read happens only when the
//! client polls for the next body chunk, so a slow client pauses the
//! provider instead of growing a buffer. Exactly one terminal record is
//! emitted per stream and nothing follows it.

use crate::api::disconnect::DisconnectStream;
use crate::core::metrics::get_metrics;
use crate::core::middleware::ProviderName;
use crate::core::StreamCancelHandle;
use crate::transformer::StreamDecoder;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Instant;

/// Raw frames read from one upstream connection.
pub type UpstreamFrames = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// One outbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamIncrement {
    Content(String),
    Error(String),
    Terminal,
}

impl StreamIncrement {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamIncrement::Terminal)
    }

    /// Serialize as one newline-terminated JSON record.
    pub fn to_ndjson(&self) -> Bytes {
        let value = match self {
            StreamIncrement::Content(text) => json!({ "response": text }),
            StreamIncrement::Error(message) => json!({ "error": message }),
            StreamIncrement::Terminal => json!({ "done": true }),
        };
        let mut line = value.to_string();
        line.push('\n');
        Bytes::from(line)
    }
}

/// Adapt frames from a reqwest response body.
pub fn upstream_frames(response: reqwest::Response) -> UpstreamFrames {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other)),
    )
}

struct NormalizerState {
    upstream: Option<UpstreamFrames>,
    decoder: Box<dyn StreamDecoder>,
    pending: VecDeque<StreamIncrement>,
    cancel_handle: StreamCancelHandle,
    provider: String,
    started: Instant,
    emitted_content: bool,
    finished: bool,
}

impl NormalizerState {
    fn queue_content(&mut self, increments: Vec<String>) {
        self.pending.extend(
            increments
                .into_iter()
                .filter(|text| !text.is_empty())
                .map(StreamIncrement::Content),
        );
    }

    /// Drop the upstream connection and queue the terminal record.
    fn close(&mut self) {
        self.upstream = None;
        self.pending.push_back(StreamIncrement::Terminal);
    }
}

enum Pulled {
    Cancelled,
    Frame(Option<std::io::Result<Bytes>>),
}

/// Wrap one decoder over one upstream frame stream.
pub fn normalize(
    frames: UpstreamFrames,
    decoder: Box<dyn StreamDecoder>,
    cancel_handle: StreamCancelHandle,
    provider: impl Into<String>,
) -> impl Stream<Item = StreamIncrement> + Send {
    let state = NormalizerState {
        upstream: Some(frames),
        decoder,
        pending: VecDeque::new(),
        cancel_handle,
        provider: provider.into(),
        started: Instant::now(),
        emitted_content: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(increment) = state.pending.pop_front() {
                match &increment {
                    StreamIncrement::Terminal => {
                        state.finished = true;
                        state.pending.clear();
                        state.cancel_handle.mark_completed();
                        tracing::debug!(provider = %state.provider, "Stream finished");
                    }
                    StreamIncrement::Content(_) => {
                        let metrics = get_metrics();
                        if !state.emitted_content {
                            state.emitted_content = true;
                            metrics
                                .ttft
                                .with_label_values(&[&state.provider])
                                .observe(state.started.elapsed().as_secs_f64());
                        }
                        metrics
                            .stream_increments
                            .with_label_values(&[&state.provider])
                            .inc();
                    }
                    StreamIncrement::Error(_) => {}
                }
                return Some((increment, state));
            }

            if state.finished {
                return None;
            }

            let cancel = state.cancel_handle.clone();
            let pulled = match state.upstream.as_mut() {
                Some(upstream) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Pulled::Cancelled,
                        frame = upstream.next() => Pulled::Frame(frame),
                    }
                }
                None => Pulled::Frame(None),
            };

            match pulled {
                Pulled::Cancelled => {
                    tracing::info!(provider = %state.provider, "Stream cancelled; dropping upstream");
                    // Returning drops `state`, and the upstream with it
                    return None;
                }
                Pulled::Frame(Some(Ok(bytes))) => {
                    let decoded = state.decoder.decode(&bytes);
                    state.queue_content(decoded.increments);
                    if decoded.terminal {
                        state.close();
                    }
                }
                Pulled::Frame(Some(Err(e))) => {
                    tracing::error!(
                        provider = %state.provider,
                        error = %e,
                        "Upstream stream failed mid-response"
                    );
                    get_metrics()
                        .upstream_errors
                        .with_label_values(&[&state.provider, "transport"])
                        .inc();
                    state
                        .pending
                        .push_back(StreamIncrement::Error(format!("Upstream stream error: {}", e)));
                    state.close();
                }
                Pulled::Frame(None) => {
                    let tail = state.decoder.finish();
                    state.queue_content(tail);
                    state.close();
                }
            }
        }
    })
}

/// Build the streaming HTTP response for a normalized stream.
pub fn ndjson_response<S>(
    increments: S,
    cancel_handle: StreamCancelHandle,
    provider: impl Into<String>,
) -> Response
where
    S: Stream<Item = StreamIncrement> + Send + 'static,
{
    let provider = provider.into();
    let body = Body::from_stream(increments.map(|inc| Ok::<_, Infallible>(inc.to_ndjson())));
    let body = Body::from_stream(DisconnectStream {
        stream: body.into_data_stream(),
        cancel_handle,
        provider: provider.clone(),
    });

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response.extensions_mut().insert(ProviderName(provider));
    response
}
