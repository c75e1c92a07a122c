//! API layer for the translation gateway.
//!
//! HTTP handlers, request models, stream normalization and the router.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod streaming;

// Re-export commonly used types
pub use handlers::{health, metrics_handler, AppState};
pub use models::{Direction, Provider, Style, TranslationRequest};
pub use routes::build_router;
pub use streaming::{ndjson_response, normalize, StreamIncrement, UpstreamFrames};
