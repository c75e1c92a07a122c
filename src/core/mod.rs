//! Core functionality for the translation gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Metrics collection and logging context
//! - Admission control (origin, rate limit, proof of humanity)
//! - HTTP middleware

pub mod admission;
pub mod cancel;
pub mod config;
pub mod error;
pub mod error_types;
pub mod humanity;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;

// Re-export commonly used types
pub use admission::{AdmissionDecision, AdmissionGate, AdmissionReason, AdmissionRequest};
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, Environment, ServerConfig};
pub use error::{AppError, Result};
pub use logging::{get_provider_context, get_request_id, PROVIDER_CONTEXT, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{admission_middleware, request_id_middleware, MetricsMiddleware};
pub use rate_limiter::{RateLimitOutcome, RateLimitStore, RateLimiter};
