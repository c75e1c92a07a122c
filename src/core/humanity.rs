//! Proof-of-humanity verification against a reCAPTCHA-compatible siteverify endpoint.

use serde::Deserialize;
use std::time::Duration;

use crate::core::config::HumanityConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanityVerdict {
    Verified,
    Rejected(String),
    /// No secret configured; the caller applies the environment policy.
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct HumanityVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
    timeout: Duration,
}

impl HumanityVerifier {
    pub fn new(client: reqwest::Client, config: &HumanityConfig) -> Self {
        Self {
            client,
            secret: config.secret_key.clone().filter(|s| !s.is_empty()),
            verify_url: config.verify_url.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a client token. Service errors and timeouts count as rejection.
    pub async fn verify(&self, token: &str, remote_ip: Option<&str>) -> HumanityVerdict {
        let Some(secret) = &self.secret else {
            return HumanityVerdict::NotConfigured;
        };

        if token.trim().is_empty() {
            return HumanityVerdict::Rejected("missing token".to_string());
        }

        let mut form = vec![("secret", secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let request = self
            .client
            .post(&self.verify_url)
            .timeout(self.timeout)
            .form(&form)
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "reCAPTCHA verification request failed");
                return HumanityVerdict::Rejected("verification service error".to_string());
            }
            Err(_) => {
                tracing::error!("reCAPTCHA verification timed out");
                return HumanityVerdict::Rejected("verification timed out".to_string());
            }
        };

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "reCAPTCHA verification returned error status");
            return HumanityVerdict::Rejected("verification service error".to_string());
        }

        match response.json::<SiteVerifyResponse>().await {
            Ok(body) if body.success => HumanityVerdict::Verified,
            Ok(body) => {
                tracing::info!(error_codes = ?body.error_codes, "reCAPTCHA token rejected");
                HumanityVerdict::Rejected(body.error_codes.join(","))
            }
            Err(e) => {
                tracing::error!(error = %e, "Malformed reCAPTCHA verification response");
                HumanityVerdict::Rejected("malformed verification response".to_string())
            }
        }
    }
}
