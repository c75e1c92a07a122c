//! Admission gate behaviour through the full router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use glossa_gateway::{
    build_router,
    core::{config::RateLimitStoreKind, init_metrics, AppConfig, Environment},
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

const FRONTEND: &str = "http://localhost:3000";

fn app(config: AppConfig) -> Router {
    init_metrics();
    build_router(Arc::new(AppState::new(config, reqwest::Client::new())))
}

fn request(origin: Option<&str>, client_ip: &str, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/translate")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client_ip);
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Body that passes the gate but fails handler validation, so no upstream is needed.
fn invalid_body() -> Value {
    json!({ "text": "x", "recaptchaToken": "tok" })
}

fn limited_config(limit: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.admission.rate_limit.store = RateLimitStoreKind::Memory;
    config.admission.rate_limit.requests = limit;
    config
}

#[tokio::test]
async fn test_rate_limit_rejection_carries_headers() {
    let app = app(limited_config(2));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request(Some(FRONTEND), "203.0.113.5", invalid_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .clone()
        .oneshot(request(Some(FRONTEND), "203.0.113.5", invalid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers();
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    let reset: i64 = headers["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
    assert!(reset > chrono::Utc::now().timestamp() - 1);
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "rate-limited");

    // Another client is unaffected
    let response = app
        .oneshot(request(Some(FRONTEND), "203.0.113.6", invalid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_origin_rejection_does_not_consume_quota() {
    let app = app(limited_config(1));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(request(Some("https://evil.example"), "198.51.100.2", invalid_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app
        .oneshot(request(Some(FRONTEND), "198.51.100.2", invalid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_humanity_token_checked_with_verifier() {
    let verifier = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .and(body_string_contains("response=good"))
        .and(body_string_contains("remoteip=192.0.2.44"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&verifier)
        .await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .and(body_string_contains("response=bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error-codes": ["invalid-input-response"]
        })))
        .expect(1)
        .mount(&verifier)
        .await;

    let mut config = AppConfig::default();
    config.admission.humanity.secret_key = Some("secret".into());
    config.admission.humanity.verify_url = format!("{}/siteverify", verifier.uri());
    let app = app(config);

    let response = app
        .clone()
        .oneshot(request(
            None,
            "192.0.2.44",
            json!({ "text": "x", "recaptchaToken": "good" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(request(None, "192.0.2.44", json!({ "text": "x", "recaptchaToken": "bad" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing token never reaches the verifier
    let response = app
        .oneshot(request(None, "192.0.2.44", json!({ "text": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_production_fails_closed_without_rate_limit_store() {
    let mut config = AppConfig::default();
    config.environment = Environment::Production;
    config.admission.rate_limit.store = RateLimitStoreKind::None;

    let response = app(config)
        .oneshot(request(Some(FRONTEND), "203.0.113.9", invalid_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");
    assert_eq!(response.headers()["x-ratelimit-limit"], "10");
}

#[tokio::test]
async fn test_development_fails_open_without_rate_limit_store() {
    let mut config = AppConfig::default();
    config.admission.rate_limit.store = RateLimitStoreKind::None;
    let app = app(config);

    for _ in 0..20 {
        let response = app
            .clone()
            .oneshot(request(Some(FRONTEND), "203.0.113.10", invalid_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let mut config = AppConfig::default();
    config.server.max_body_bytes = 32;

    let response = app(config)
        .oneshot(request(
            None,
            "203.0.113.11",
            json!({ "text": "α".repeat(100), "direction": "modern-to-ancient" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let response = app(AppConfig::default())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/translate-gemini")
                .header("origin", FRONTEND)
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], FRONTEND);
}
