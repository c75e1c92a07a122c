//! Router assembly.

use crate::api::handlers::{
    health, metrics_handler, translate_deepseek, translate_gemini, translate_local_model,
    translate_openai, translate_tgi, AppState,
};
use crate::core::middleware::{
    admission_middleware, request_id_middleware, MetricsMiddleware, HUMANITY_TOKEN_HEADER,
    REQUEST_ID_HEADER,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// CORS for the configured browser origins only.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(HUMANITY_TOKEN_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(Duration::from_secs(600))
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.admission.allowed_origins());

    // Metrics wrap the gate so rejections are counted too
    let api_routes = Router::new()
        .route("/api/translate", post(translate_local_model))
        .route("/api/translate-gemini", post(translate_gemini))
        .route("/api/translate-deepseek", post(translate_deepseek))
        .route("/api/translate-deepsick", post(translate_deepseek))
        .route("/api/translate-gpt", post(translate_openai))
        .route("/api/translate-tgi", post(translate_tgi))
        .layer(axum::middleware::from_fn_with_state(
            state.admission.clone(),
            admission_middleware,
        ))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
