//! HTTP middleware for admission control, request tracking and metrics.

use crate::core::admission::{AdmissionDecision, AdmissionGate, AdmissionRequest};
use crate::core::error::AppError;
use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::metrics::get_metrics;
use crate::core::rate_limiter::client_key;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Header carrying the proof-of-humanity token when the body does not.
pub const HUMANITY_TOKEN_HEADER: &str = "x-recaptcha-token";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extension type for storing provider name in response
#[derive(Clone, Debug)]
pub struct ProviderName(pub String);

/// Token from the JSON body's `recaptchaToken`, falling back to the header.
pub fn extract_humanity_token(body: &[u8], headers: &HeaderMap) -> Option<String> {
    let from_body = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("recaptchaToken")
                .and_then(|t| t.as_str())
                .map(|s| s.to_string())
        })
        .filter(|t| !t.is_empty());

    from_body.or_else(|| {
        headers
            .get(HUMANITY_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Run the admission gate.
///
/// Origin and rate-limit checks run on the headers alone. The body is
/// buffered only for the humanity check, then handed on to the handler.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let mut admission = AdmissionRequest {
        origin: parts
            .headers
            .get(axum::http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        client_key: client_key(&parts.headers),
        rate_limited: parts.method == Method::POST,
        humanity_token: None,
    };

    let rate_limit = match gate.evaluate_headers(&admission).await {
        Ok(rate_limit) => rate_limit,
        Err(decision) => return reject(parts.uri.path(), &admission, decision),
    };

    let bytes = match axum::body::to_bytes(body, gate.max_body_bytes()).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, limit = gate.max_body_bytes(), "Failed to read request body");
            return AppError::BadRequest("Request body is too large or unreadable".to_string())
                .into_response();
        }
    };

    admission.humanity_token = extract_humanity_token(&bytes, &parts.headers);
    let decision = gate.evaluate_humanity(&admission, rate_limit).await;
    if !decision.allowed {
        return reject(parts.uri.path(), &admission, decision);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

fn reject(path: &str, admission: &AdmissionRequest, decision: AdmissionDecision) -> Response {
    tracing::info!(
        path = %path,
        client = %admission.client_key,
        reason = decision.reason.as_str(),
        "Request rejected by admission gate"
    );
    match decision.into_error() {
        Some(error) => error.into_response(),
        None => AppError::Internal("admission rejected without a reason".to_string()).into_response(),
    }
}

/// Assign a request id (or honor the caller's) and scope it for logging.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(|v| v.to_string())
        .unwrap_or_else(generate_request_id);

    let mut response = REQUEST_ID
        .scope(request_id.clone(), async move { next.run(request).await })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for incoming requests.
    ///
    /// Counts active requests, measures duration and records the status code
    /// together with the provider the handler reported.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .inc();

        let start = Instant::now();
        let response = next.run(request).await;

        // For streaming responses this is time to headers, not body completion
        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        let provider = response
            .extensions()
            .get::<ProviderName>()
            .map(|p| p.0.as_str())
            .unwrap_or("none");

        metrics
            .request_count
            .with_label_values(&[&method, &endpoint, provider, &status_code])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint, provider])
            .observe(duration);

        if endpoint.starts_with("/api/") {
            tracing::info!(
                method = %method,
                endpoint = %endpoint,
                provider = provider,
                status = %status_code,
                duration_ms = (duration * 1000.0) as u64,
                "Request handled"
            );
        }

        metrics
            .active_requests
            .with_label_values(&[&endpoint])
            .dec();

        response
    }
}
