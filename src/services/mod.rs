//! Service layer: prompt rendering and provider dispatch.

pub mod gemini_client;
pub mod prompts;
pub mod provider_service;

pub use gemini_client::GeminiClient;
pub use provider_service::ProviderService;
