//! Glossa Gateway - a streaming translation gateway for Modern and Ancient Greek
//!
//! The server fronts several text-generation providers behind one wire
//! format:
//!
//! - **Stream Normalization**: each provider's streaming dialect is decoded
//!   into newline-delimited JSON records of translated text
//! - **Admission Control**: origin allow-list, sliding-window rate limit and
//!   reCAPTCHA verification, applied before any provider is contacted
//! - **Cancellation**: a client disconnect drops the upstream connection
//! - **Metrics & Logging**: Prometheus metrics and request-scoped tracing
//!
//! # Architecture
//!
//! - [`core`]: config, errors, admission, rate limiting, metrics, middleware
//! - [`transformer`]: provider wire types and stream decoders
//! - [`services`]: prompt rendering and provider dispatch
//! - [`api`]: handlers, stream normalizer and router
//!
//! # Configuration
//!
//! Configuration is read from the YAML file named by `CONFIG_PATH`, or from
//! environment variables alone. Commonly used variables:
//! - `HOST`, `PORT`: bind address (default: 0.0.0.0:18000)
//! - `APP_ENV`: `development` or `production`
//! - `ALLOWED_ORIGINS`: comma-separated browser origins
//! - `GEMINI_API_KEY`, `DEEPSEEK_API_KEY`, `OPENAI_API_KEY`, `TGI_API_KEY`
//! - `OLLAMA_BASE_URL`, `TGI_BASE_URL`: self-hosted endpoints
//! - `UPSTASH_REDIS_REST_URL`, `UPSTASH_REDIS_REST_TOKEN`: rate-limit store
//! - `RECAPTCHA_SECRET_KEY`: proof-of-humanity secret

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, Provider, TranslationRequest};
pub use core::{AppConfig, AppError, Environment, Result};
pub use services::ProviderService;
