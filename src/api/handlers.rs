//! HTTP request handlers for the translation API.
//!
//! One handler per provider route. Each validates the body, opens the
//! upstream stream and hands it to the normalizer. Everything that can fail
//! before the first byte is reported as a JSON error with a proper status.

use crate::api::models::{Provider, TranslationRequest};
use crate::api::streaming::{ndjson_response, normalize};
use crate::core::admission::AdmissionGate;
use crate::core::config::AppConfig;
use crate::core::error::AppError;
use crate::core::logging::{get_provider_context, get_request_id};
use crate::core::middleware::ProviderName;
use crate::core::{metrics, Result, StreamCancelHandle};
use crate::services::ProviderService;
use crate::with_request_context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub provider_service: ProviderService,
    pub admission: Arc<AdmissionGate>,
}

impl AppState {
    pub fn new(config: AppConfig, http_client: reqwest::Client) -> Self {
        let provider_service = ProviderService::new(&config, http_client.clone());
        let admission = Arc::new(AdmissionGate::from_config(&config, http_client));
        Self {
            provider_service,
            admission,
        }
    }
}

/// Local model (Ollama) translation.
pub async fn translate_local_model(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    translate(state, Provider::LocalModel, body).await
}

pub async fn translate_gemini(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    translate(state, Provider::Gemini, body).await
}

/// DeepSeek translation. Also mounted under the legacy `translate-deepsick` path.
pub async fn translate_deepseek(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    translate(state, Provider::DeepSeek, body).await
}

pub async fn translate_openai(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    translate(state, Provider::OpenAi, body).await
}

pub async fn translate_tgi(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    translate(state, Provider::Tgi, body).await
}

async fn translate(state: Arc<AppState>, provider: Provider, body: Bytes) -> Response {
    with_request_context!(get_request_id(), provider.as_str().to_string(), async {
        match open_translation(&state, provider, &body).await {
            Ok(response) => response,
            Err(e) => error_response(e),
        }
    })
}

/// Render a failure that happened before streaming, tagged with the provider
/// in context so the metrics layer can label it.
fn error_response(error: AppError) -> Response {
    let provider = get_provider_context();
    tracing::warn!(
        provider = %provider,
        request_id = %get_request_id(),
        status = error.status().as_u16(),
        error = %error,
        "Translation failed before streaming"
    );
    let mut response = error.into_response();
    response.extensions_mut().insert(ProviderName(provider));
    response
}

#[tracing::instrument(skip(state, provider, body), fields(provider = %provider, request_id = %get_request_id()))]
async fn open_translation(state: &AppState, provider: Provider, body: &[u8]) -> Result<Response> {
    let request = TranslationRequest::from_body(body, provider)?;
    let frames = state.provider_service.open_stream(&request).await?;

    let cancel_handle = StreamCancelHandle::new();
    let increments = normalize(
        frames,
        provider.wire_format().decoder(),
        cancel_handle.clone(),
        provider.as_str(),
    );
    tracing::debug!(wire_format = provider.wire_format().as_str(), "Streaming translation");
    Ok(ndjson_response(increments, cancel_handle, provider.as_str()))
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        metrics::render(),
    )
}
