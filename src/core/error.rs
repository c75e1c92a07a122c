//! Error types and handling for the translation gateway.
//!
//! This module provides a unified error type [`AppError`] covering every failure
//! that is reported before a response stream starts, and its HTTP rendering.
//! Failures after streaming began never surface here: the stream normalizer
//! signals them in-band.

use crate::core::error_types::*;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors raised while loading settings
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Missing or invalid request fields
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The selected provider has no credential or endpoint configured
    #[error("{0} is not configured on the server")]
    ProviderNotConfigured(String),

    /// The selected provider is switched off in this environment
    #[error("{provider} is disabled in the {environment} environment")]
    ProviderDisabled {
        provider: String,
        environment: String,
    },

    /// Non-success status from an upstream provider
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Upstream provider could not be reached
    #[error("Failed to connect to {provider}: {message}")]
    UpstreamUnreachable { provider: String, message: String },

    /// Request timeout errors
    #[error("Gateway timeout")]
    Timeout,

    /// Origin header not on the allow-list
    #[error("Forbidden (Invalid Origin)")]
    OriginDenied,

    /// Sliding-window limit exhausted for the client
    #[error("Πολλά αιτήματα ανά λεπτό. Παρακαλώ προσπαθήστε ξανά σε ένα λεπτό.")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at_secs: i64,
        retry_after_secs: u64,
    },

    /// Missing or rejected proof-of-humanity token
    #[error("reCAPTCHA verification failed")]
    HumanityCheckFailed,

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderNotConfigured(_) | AppError::ProviderDisabled { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::OriginDenied => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::HumanityCheckFailed => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => ERROR_TYPE_INVALID_REQUEST,
            AppError::Config(_)
            | AppError::ProviderNotConfigured(_)
            | AppError::ProviderDisabled { .. } => ERROR_TYPE_CONFIGURATION,
            AppError::Upstream { .. } | AppError::UpstreamUnreachable { .. } => {
                ERROR_TYPE_UPSTREAM
            }
            AppError::Timeout => ERROR_TYPE_TIMEOUT,
            AppError::OriginDenied | AppError::HumanityCheckFailed => ERROR_TYPE_ADMISSION,
            AppError::RateLimited { .. } => ERROR_TYPE_RATE_LIMIT,
            AppError::Internal(_) => ERROR_TYPE_API,
        }
    }

    fn error_code(&self, status: StatusCode) -> serde_json::Value {
        match self {
            AppError::ProviderNotConfigured(_) => json!(ERROR_CODE_PROVIDER_NOT_CONFIGURED),
            AppError::ProviderDisabled { .. } => json!(ERROR_CODE_PROVIDER_DISABLED),
            AppError::OriginDenied => json!(ERROR_CODE_ORIGIN_DENIED),
            AppError::RateLimited { .. } => json!(ERROR_CODE_RATE_LIMITED),
            AppError::HumanityCheckFailed => json!(ERROR_CODE_HUMANITY_CHECK_FAILED),
            _ => json!(status.as_u16()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.error_code(status)
            }
        }));

        let mut response = (status, body).into_response();

        if let AppError::RateLimited {
            limit,
            remaining,
            reset_at_secs,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_at_secs));
            headers.insert("Retry-After", HeaderValue::from(retry_after_secs));
        }

        response
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::ProviderNotConfigured("Gemini API key".to_string()).to_string(),
            "Gemini API key is not configured on the server"
        );
        assert_eq!(AppError::Timeout.to_string(), "Gateway timeout");
        assert_eq!(
            AppError::Internal("test error".to_string()).to_string(),
            "Internal server error: test error"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ProviderNotConfigured("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::OriginDenied.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::HumanityCheckFailed.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::UpstreamUnreachable {
                provider: "Ollama".into(),
                message: "connection refused".into()
            }
            .into_response()
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_upstream_status_passthrough() {
        let err = AppError::Upstream {
            status: 401,
            message: "OpenAI API error: Incorrect API key provided".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);

        let err = AppError::Upstream {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_upstream_status_falls_back_to_bad_gateway() {
        let err = AppError::Upstream {
            status: 42,
            message: "weird".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = AppError::RateLimited {
            limit: 10,
            remaining: 0,
            reset_at_secs: 1_700_000_060,
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["X-RateLimit-Limit"], "10");
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        assert_eq!(headers["X-RateLimit-Reset"], "1700000060");
        assert_eq!(headers["Retry-After"], "42");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let json = body_json(AppError::BadRequest("Missing text".into()).into_response()).await;
        assert_eq!(json["error"]["message"], "Bad request: Missing text");
        assert_eq!(json["error"]["type"], ERROR_TYPE_INVALID_REQUEST);
        assert_eq!(json["error"]["code"], 400);

        let json = body_json(AppError::OriginDenied.into_response()).await;
        assert_eq!(json["error"]["code"], ERROR_CODE_ORIGIN_DENIED);
    }

    #[test]
    fn test_error_from_anyhow() {
        let app_err: AppError = anyhow::anyhow!("test error").into();
        assert!(matches!(app_err, AppError::Config(_)));
    }
}
