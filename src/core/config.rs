//! Configuration management for the translation gateway.
//!
//! Configuration is loaded once at startup into an [`AppConfig`] value and passed
//! down explicitly. It can come purely from environment variables
//! ([`AppConfig::from_env`]) or from a YAML file with `${VAR}` expansion
//! ([`AppConfig::load`]); environment variables always take precedence.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, body limit)
    #[serde(default)]
    pub server: ServerConfig,

    /// Deployment environment; production disables the local model and
    /// makes the admission gate fail closed
    #[serde(default)]
    pub environment: Environment,

    /// Request timeout in seconds for upstream providers
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Origin, rate limit and humanity-check settings
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Upstream provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            environment: Environment::default(),
            request_timeout_secs: default_request_timeout(),
            admission: AdmissionConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Deployment environment flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        })
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest request body the admission gate will buffer
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Admission gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Origins accepted when a request carries an `Origin` header
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub humanity: HumanityConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            rate_limit: RateLimitConfig::default(),
            humanity: HumanityConfig::default(),
        }
    }
}

/// Backing store used by the sliding-window rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStoreKind {
    /// No store configured; the environment policy decides
    #[default]
    None,
    /// Process-local store, not shared across instances
    Memory,
    /// Upstash Redis over its REST interface
    Upstash,
}

impl FromStr for RateLimitStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "off" => Ok(RateLimitStoreKind::None),
            "memory" => Ok(RateLimitStoreKind::Memory),
            "upstash" | "redis" => Ok(RateLimitStoreKind::Upstash),
            other => Err(anyhow::anyhow!("unknown rate limit store: {}", other)),
        }
    }
}

/// Sliding-window rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u32,

    /// Window size in seconds
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,

    #[serde(default)]
    pub store: RateLimitStoreKind,

    #[serde(default)]
    pub upstash_url: Option<String>,

    #[serde(default)]
    pub upstash_token: Option<String>,

    /// Bound on a single store round trip
    #[serde(default = "default_check_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_limit_requests(),
            window_secs: default_rate_limit_window(),
            store: RateLimitStoreKind::None,
            upstash_url: None,
            upstash_token: None,
            timeout_ms: default_check_timeout_ms(),
        }
    }
}

/// Proof-of-humanity (reCAPTCHA siteverify) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanityConfig {
    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    #[serde(default = "default_check_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HumanityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: default_verify_url(),
            timeout_ms: default_check_timeout_ms(),
        }
    }
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_local_model")]
    pub ollama: LocalModelConfig,

    #[serde(default)]
    pub gemini: CloudProviderConfig,

    #[serde(default)]
    pub deepseek: CloudProviderConfig,

    #[serde(default)]
    pub openai: CloudProviderConfig,

    #[serde(default)]
    pub tgi: CloudProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ollama: default_local_model(),
            gemini: CloudProviderConfig::default(),
            deepseek: CloudProviderConfig::default(),
            openai: CloudProviderConfig::default(),
            tgi: CloudProviderConfig::default(),
        }
    }
}

/// Local model server (Ollama) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Base URL of the local server; `None` means not configured
    #[serde(default = "default_ollama_url")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
}

/// Hosted provider configuration. Unset base URL and model fall back to the
/// provider's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Generation cap, used by providers that require one
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    18000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_request_timeout() -> u64 {
    300
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_rate_limit_requests() -> u32 {
    10
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_check_timeout_ms() -> u64 {
    5000
}

fn default_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_ollama_url() -> Option<String> {
    Some("http://localhost:11434".to_string())
}

fn default_local_model() -> LocalModelConfig {
    LocalModelConfig {
        base_url: default_ollama_url(),
        model: None,
    }
}

impl AppConfig {
    /// Build configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use glossa_gateway::core::config::AppConfig;
    ///
    /// let config = AppConfig::load("config.yaml").expect("Failed to load config");
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let expanded = expand_env_vars(&content);

        let settings = config::Config::builder()
            .add_source(config::File::from_str(&expanded, config::FileFormat::Yaml))
            .build()
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Invalid config file: {}", path))?;

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override values with environment variables (env vars take precedence).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(host) = env_string("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            self.server.port = port;
        }
        if let Some(limit) = env_parse::<usize>("MAX_BODY_BYTES") {
            self.server.max_body_bytes = limit;
        }
        if let Some(timeout) = env_parse::<u64>("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = timeout;
        }
        if let Some(env) = env_string("APP_ENV").or_else(|| env_string("NODE_ENV")) {
            self.environment = env.parse().unwrap_or_default();
        }

        let admission = &mut self.admission;
        if let Some(origins) = env_string("ALLOWED_ORIGINS") {
            admission.allowed_origins = split_list(&origins);
        } else if let Some(frontend) = env_string("NEXT_PUBLIC_FRONTEND_URL") {
            admission.allowed_origins = vec![frontend];
        }

        let rate_limit = &mut admission.rate_limit;
        if let Some(requests) = env_parse::<u32>("RATE_LIMIT_REQUESTS") {
            rate_limit.requests = requests;
        }
        if let Some(window) = env_parse::<u64>("RATE_LIMIT_WINDOW_SECS") {
            rate_limit.window_secs = window;
        }
        if let Some(timeout) = env_parse::<u64>("RATE_LIMIT_TIMEOUT_MS") {
            rate_limit.timeout_ms = timeout;
        }
        if let Some(url) = env_string("UPSTASH_REDIS_REST_URL") {
            rate_limit.upstash_url = Some(url);
        }
        if let Some(token) = env_string("UPSTASH_REDIS_REST_TOKEN") {
            rate_limit.upstash_token = Some(token);
        }
        if let Some(store) = env_string("RATE_LIMIT_STORE") {
            rate_limit.store = store.parse()?;
        } else if rate_limit.store == RateLimitStoreKind::None
            && rate_limit.upstash_url.is_some()
            && rate_limit.upstash_token.is_some()
        {
            rate_limit.store = RateLimitStoreKind::Upstash;
        }

        let humanity = &mut admission.humanity;
        if let Some(secret) = env_string("RECAPTCHA_SECRET_KEY") {
            humanity.secret_key = Some(secret);
        }
        if let Some(url) = env_string("RECAPTCHA_VERIFY_URL") {
            humanity.verify_url = url;
        }
        if let Some(timeout) = env_parse::<u64>("RECAPTCHA_TIMEOUT_MS") {
            humanity.timeout_ms = timeout;
        }

        let providers = &mut self.providers;
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            // An explicitly empty value switches the local model off
            providers.ollama.base_url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
        }
        if let Some(model) = env_string("OLLAMA_MODEL") {
            providers.ollama.model = Some(model);
        }
        apply_cloud_env(&mut providers.gemini, "GEMINI");
        apply_cloud_env(&mut providers.deepseek, "DEEPSEEK");
        apply_cloud_env(&mut providers.openai, "OPENAI");
        apply_cloud_env(&mut providers.tgi, "TGI");

        Ok(())
    }
}

fn apply_cloud_env(provider: &mut CloudProviderConfig, prefix: &str) {
    if let Some(key) = env_string(&format!("{}_API_KEY", prefix)) {
        provider.api_key = Some(key);
    }
    if let Some(url) = env_string(&format!("{}_BASE_URL", prefix)) {
        provider.base_url = Some(url);
    }
    if let Some(model) = env_string(&format!("{}_MODEL", prefix)) {
        provider.model = Some(model);
    }
    if let Some(max) = env_parse::<u32>(&format!("{}_MAX_NEW_TOKENS", prefix)) {
        provider.max_new_tokens = Some(max);
    }
}

/// Read a non-empty, trimmed environment variable.
fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    let re = match Regex::new(r#"\$\{([^}:]+)(?::-?([^}]*))?\}"#) {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
    })
    .to_string()
}
