//! Request models for the translation API.

use crate::core::error::{AppError, Result};
use crate::transformer::WireFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Translation direction between the two registers of Greek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    ModernToAncient,
    AncientToModern,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ModernToAncient => "modern-to-ancient",
            Direction::AncientToModern => "ancient-to-modern",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "modern-to-ancient" => Some(Direction::ModernToAncient),
            "ancient-to-modern" => Some(Direction::AncientToModern),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    #[default]
    Standard,
    FormalRegister,
}

impl Style {
    pub fn as_str(self) -> &'static str {
        match self {
            Style::Standard => "standard",
            Style::FormalRegister => "formal-register",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Style::Standard),
            "formal-register" => Some(Style::FormalRegister),
            _ => None,
        }
    }
}

/// Upstream provider, selected by the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Ollama running a local model
    LocalModel,
    Gemini,
    DeepSeek,
    OpenAi,
    /// Hosted text-generation-inference endpoint
    Tgi,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::LocalModel,
        Provider::Gemini,
        Provider::DeepSeek,
        Provider::OpenAi,
        Provider::Tgi,
    ];

    /// Stable identifier used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::LocalModel => "local-model",
            Provider::Gemini => "gemini",
            Provider::DeepSeek => "deepseek",
            Provider::OpenAi => "openai",
            Provider::Tgi => "tgi",
        }
    }

    /// Human-readable name used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::LocalModel => "Ollama",
            Provider::Gemini => "Gemini",
            Provider::DeepSeek => "DeepSeek",
            Provider::OpenAi => "OpenAI",
            Provider::Tgi => "TGI",
        }
    }

    pub fn wire_format(self) -> WireFormat {
        match self {
            Provider::LocalModel => WireFormat::GenerateNdjson,
            Provider::Gemini => WireFormat::Generator,
            Provider::DeepSeek | Provider::OpenAi => WireFormat::ChatCompletions,
            Provider::Tgi => WireFormat::TokenEvents,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound JSON body. Fields stay loose so validation can report precise errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    /// Consumed by the admission gate; ignored here.
    #[serde(default)]
    pub recaptcha_token: Option<String>,
}

/// A validated translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub direction: Direction,
    pub style: Style,
    pub provider: Provider,
}

impl TranslationRequest {
    /// Parse and validate a raw request body for the given provider.
    pub fn from_body(body: &[u8], provider: Provider) -> Result<Self> {
        let payload: TranslationPayload = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        payload.validate(provider)
    }
}

impl TranslationPayload {
    pub fn validate(self, provider: Provider) -> Result<TranslationRequest> {
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing text or direction in request body".into()))?;

        let direction = self
            .direction
            .ok_or_else(|| AppError::BadRequest("Missing text or direction in request body".into()))?;
        let direction = Direction::parse(&direction).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid translation direction provided: {}", direction))
        })?;

        let style = match self.style.as_deref() {
            None | Some("") => Style::default(),
            Some(raw) => Style::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid style provided: {}", raw)))?,
        };

        Ok(TranslationRequest {
            text,
            direction,
            style,
            provider,
        })
    }
}
