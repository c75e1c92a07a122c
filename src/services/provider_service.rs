//! Provider dispatch.
//!
//! Maps a validated translation request onto one upstream call: endpoint,
//! credential, body shape and wire format. Configuration problems are
//! reported before any network traffic.

use crate::api::models::{Provider, TranslationRequest};
use crate::api::streaming::{upstream_frames, UpstreamFrames};
use crate::core::config::{AppConfig, CloudProviderConfig, Environment, ProvidersConfig};
use crate::core::error::{AppError, Result};
use crate::core::error_types::truncate_snippet;
use crate::core::metrics::get_metrics;
use crate::services::gemini_client::GeminiClient;
use crate::services::prompts;
use crate::transformer::ollama::OllamaGenerateRequest;
use crate::transformer::openai::{OpenAIChatRequest, OpenAIMessage};
use crate::transformer::tgi::{TgiGenerateRequest, TgiParameters};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_OLLAMA_MODEL: &str = "ilsp/meltemi-instruct";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_TGI_MAX_NEW_TOKENS: u32 = 512;

/// Dispatches translation requests to upstream providers.
#[derive(Clone)]
pub struct ProviderService {
    http: reqwest::Client,
    providers: Arc<ProvidersConfig>,
    environment: Environment,
}

impl ProviderService {
    pub fn new(config: &AppConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            providers: Arc::new(config.providers.clone()),
            environment: config.environment,
        }
    }

    /// Fail fast when `provider` cannot be called in this deployment.
    pub fn check_configured(&self, provider: Provider) -> Result<()> {
        match provider {
            Provider::LocalModel => {
                if self.environment.is_production() {
                    return Err(AppError::ProviderDisabled {
                        provider: provider.display_name().to_string(),
                        environment: self.environment.as_str().to_string(),
                    });
                }
                if self.providers.ollama.base_url.is_none() {
                    return Err(AppError::ProviderNotConfigured("Ollama endpoint".to_string()));
                }
                Ok(())
            }
            Provider::Tgi => {
                if self.providers.tgi.base_url.is_none() {
                    return Err(AppError::ProviderNotConfigured("TGI endpoint".to_string()));
                }
                Ok(())
            }
            Provider::Gemini | Provider::DeepSeek | Provider::OpenAi => {
                self.api_key(provider).map(|_| ())
            }
        }
    }

    fn cloud_config(&self, provider: Provider) -> Option<&CloudProviderConfig> {
        match provider {
            Provider::Gemini => Some(&self.providers.gemini),
            Provider::DeepSeek => Some(&self.providers.deepseek),
            Provider::OpenAi => Some(&self.providers.openai),
            Provider::Tgi => Some(&self.providers.tgi),
            Provider::LocalModel => None,
        }
    }

    fn api_key(&self, provider: Provider) -> Result<&str> {
        self.cloud_config(provider)
            .and_then(|c| c.api_key.as_deref())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                tracing::error!(provider = %provider, "API key not configured");
                AppError::ProviderNotConfigured(format!("{} API key", provider.display_name()))
            })
    }

    /// Issue the upstream call and return its raw frames.
    ///
    /// Returns only after the upstream answered with a success status, so
    /// every error here is reported before streaming begins.
    pub async fn open_stream(&self, request: &TranslationRequest) -> Result<UpstreamFrames> {
        self.check_configured(request.provider)?;

        let prompt = prompts::render(
            request.provider,
            request.direction,
            request.style,
            &request.text,
        );

        tracing::info!(
            provider = %request.provider,
            direction = request.direction.as_str(),
            style = request.style.as_str(),
            chars = request.text.chars().count(),
            "Dispatching translation"
        );

        match request.provider {
            Provider::LocalModel => {
                let config = &self.providers.ollama;
                let base = config.base_url.as_deref().unwrap_or_default();
                let body = OllamaGenerateRequest {
                    model: config
                        .model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
                    prompt: prompt.flattened(),
                    stream: true,
                };
                self.post(Provider::LocalModel, &endpoint(base, "/api/generate"), None, &body)
                    .await
            }
            Provider::DeepSeek | Provider::OpenAi => {
                let provider = request.provider;
                let (config, default_base, default_model) = if provider == Provider::DeepSeek {
                    (&self.providers.deepseek, DEFAULT_DEEPSEEK_BASE_URL, DEFAULT_DEEPSEEK_MODEL)
                } else {
                    (&self.providers.openai, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL)
                };
                let base = config.base_url.as_deref().unwrap_or(default_base);

                let mut messages = Vec::with_capacity(2);
                if let Some(system) = prompt.system {
                    messages.push(OpenAIMessage::system(system));
                }
                messages.push(OpenAIMessage::user(prompt.user));

                let body = OpenAIChatRequest {
                    model: config
                        .model
                        .clone()
                        .unwrap_or_else(|| default_model.to_string()),
                    messages,
                    stream: true,
                };
                let key = self.api_key(provider)?;
                self.post(provider, &endpoint(base, "/chat/completions"), Some(key), &body)
                    .await
            }
            Provider::Tgi => {
                let config = &self.providers.tgi;
                let base = config.base_url.as_deref().unwrap_or_default();
                let body = TgiGenerateRequest {
                    inputs: prompt.flattened(),
                    parameters: TgiParameters {
                        max_new_tokens: config.max_new_tokens.unwrap_or(DEFAULT_TGI_MAX_NEW_TOKENS),
                    },
                    stream: true,
                };
                let key = config.api_key.as_deref().filter(|k| !k.is_empty());
                self.post(Provider::Tgi, &endpoint(base, "/generate_stream"), key, &body)
                    .await
            }
            Provider::Gemini => {
                let config = &self.providers.gemini;
                let client = GeminiClient::new(
                    self.http.clone(),
                    config.base_url.as_deref(),
                    self.api_key(Provider::Gemini)?,
                    config.model.as_deref(),
                );
                let chunks = client.generate_content_stream(&prompt.user).await?;
                Ok(Box::pin(chunks.map(|chunk| chunk.map(Bytes::from))))
            }
        }
    }

    async fn post<B: Serialize>(
        &self,
        provider: Provider,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<UpstreamFrames> {
        let mut builder = self.http.post(url).json(body);
        if let Some(key) = bearer {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;
        let response = ensure_success(provider, response).await?;
        tracing::debug!(provider = %provider, url = %url, "Upstream stream opened");
        Ok(upstream_frames(response))
    }

    /// Log which providers are usable at startup.
    pub fn log_providers(&self) {
        tracing::info!(
            environment = self.environment.as_str(),
            "Starting translation gateway"
        );
        for provider in Provider::ALL {
            match self.check_configured(provider) {
                Ok(()) => tracing::info!("  - {}: enabled", provider.display_name()),
                Err(e) => tracing::info!("  - {}: unavailable ({})", provider.display_name(), e),
            }
        }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Map a failed send to 504 on timeout, 502 otherwise.
pub(crate) fn transport_error(provider: Provider, e: reqwest::Error) -> AppError {
    get_metrics()
        .upstream_errors
        .with_label_values(&[provider.as_str(), "transport"])
        .inc();
    if e.is_timeout() {
        tracing::error!(provider = %provider, error = %e, "Upstream request timed out");
        AppError::Timeout
    } else {
        tracing::error!(provider = %provider, error = %e, "Failed to reach upstream");
        AppError::UpstreamUnreachable {
            provider: provider.display_name().to_string(),
            message: e.to_string(),
        }
    }
}

/// Pass successful responses through; turn anything else into `AppError::Upstream`.
pub(crate) async fn ensure_success(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = %provider,
        status = status.as_u16(),
        body = %truncate_snippet(&body),
        "Upstream returned error status"
    );
    get_metrics()
        .upstream_errors
        .with_label_values(&[provider.as_str(), status.as_str()])
        .inc();

    Err(AppError::Upstream {
        status: status.as_u16(),
        message: format!(
            "{} API returned error: {} - {}",
            provider.display_name(),
            status.as_u16(),
            extract_error_message(&body)
        ),
    })
}

/// `error.message` or a string `error` from a JSON body, else the raw body; truncated.
pub fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| match json.get("error") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(obj) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string());
    truncate_snippet(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{Direction, Style};
    use assert_matches::assert_matches;

    fn config_with(mutate: impl FnOnce(&mut AppConfig)) -> AppConfig {
        let mut config = AppConfig::default();
        mutate(&mut config);
        config
    }

    fn service(config: &AppConfig) -> ProviderService {
        ProviderService::new(config, reqwest::Client::new())
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        let svc = service(&AppConfig::default());
        for provider in [Provider::Gemini, Provider::DeepSeek, Provider::OpenAi] {
            assert_matches!(
                svc.check_configured(provider),
                Err(AppError::ProviderNotConfigured(_))
            );
        }
        assert_matches!(
            svc.check_configured(Provider::Tgi),
            Err(AppError::ProviderNotConfigured(_))
        );
    }

    #[test]
    fn test_local_model_enabled_by_default_outside_production() {
        let svc = service(&AppConfig::default());
        assert!(svc.check_configured(Provider::LocalModel).is_ok());
    }

    #[test]
    fn test_local_model_disabled_in_production() {
        let config = config_with(|c| c.environment = Environment::Production);
        assert_matches!(
            service(&config).check_configured(Provider::LocalModel),
            Err(AppError::ProviderDisabled { .. })
        );
    }

    #[test]
    fn test_local_model_without_endpoint() {
        let config = config_with(|c| c.providers.ollama.base_url = None);
        assert_matches!(
            service(&config).check_configured(Provider::LocalModel),
            Err(AppError::ProviderNotConfigured(_))
        );
    }

    #[test]
    fn test_configured_key_passes() {
        let config = config_with(|c| c.providers.deepseek.api_key = Some("sk-test".into()));
        assert!(service(&config).check_configured(Provider::DeepSeek).is_ok());
    }

    #[tokio::test]
    async fn test_open_stream_fails_fast_without_network() {
        let svc = service(&AppConfig::default());
        let request = TranslationRequest {
            text: "καλημέρα".into(),
            direction: Direction::ModernToAncient,
            style: Style::Standard,
            provider: Provider::OpenAi,
        };
        assert_matches!(
            svc.open_stream(&request).await.err(),
            Some(AppError::ProviderNotConfigured(m)) if m == "OpenAI API key"
        );
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"Invalid API key","type":"auth"}}"#),
            "Invalid API key"
        );
        assert_eq!(extract_error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(extract_error_message("  plain failure \n"), "plain failure");
        assert_eq!(extract_error_message(&"x".repeat(500)).len(), 203);
    }
}
