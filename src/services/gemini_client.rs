//! Native streaming client for Gemini `streamGenerateContent`.
//!
//! Yields decoded text chunks, one per streamed response, the way an SDK
//! generator would. Completion of the stream is the end of the response.

use crate::api::models::Provider;
use crate::core::error::Result;
use crate::transformer::gemini::{GeminiGenerateRequest, GeminiStreamChunk};
use crate::transformer::{Record, RecordFramer};
use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Decoded text chunks from one generation.
pub type TextChunkStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Option<&str>,
        api_key: impl Into<String>,
        model: Option<&str>,
    ) -> Self {
        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: model.unwrap_or(DEFAULT_GEMINI_MODEL).to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    /// Start a generation. Fails before yielding anything on a non-success status.
    pub async fn generate_content_stream(&self, prompt: &str) -> Result<TextChunkStream> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiGenerateRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(|e| super::provider_service::transport_error(Provider::Gemini, e))?;

        let response = super::provider_service::ensure_success(Provider::Gemini, response).await?;
        tracing::debug!(model = %self.model, "Gemini stream opened");

        let mut body = response.bytes_stream();
        let stream = stream! {
            let mut framer = RecordFramer::sse();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(std::io::Error::other(e));
                        return;
                    }
                };
                for record in framer.push(&chunk) {
                    if let Some(text) = chunk_text(record) {
                        yield Ok(text);
                    }
                }
            }
            for record in framer.finish() {
                if let Some(text) = chunk_text(record) {
                    yield Ok(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn chunk_text(record: Record) -> Option<String> {
    let Record::Data(payload) = record else {
        return None;
    };
    match serde_json::from_str::<GeminiStreamChunk>(&payload) {
        Ok(chunk) => Some(chunk.text()).filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse Gemini stream chunk");
            None
        }
    }
}
