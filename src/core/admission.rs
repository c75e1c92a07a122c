//! Admission gate: origin allow-list, sliding-window rate limit, proof of humanity.
//!
//! Checks run in that order and the first failure decides. A request that
//! fails the origin check never touches the rate-limit store, and a request
//! that is rate limited never reaches the verification service.

use crate::core::config::{AppConfig, Environment};
use crate::core::error::AppError;
use crate::core::humanity::{HumanityVerdict, HumanityVerifier};
use crate::core::metrics::get_metrics;
use crate::core::rate_limiter::{
    RateLimitCheck, RateLimitOutcome, RateLimiter, ANONYMOUS_CLIENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionReason {
    Ok,
    OriginDenied,
    RateLimited,
    HumanityCheckFailed,
}

impl AdmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReason::Ok => "ok",
            AdmissionReason::OriginDenied => "origin-denied",
            AdmissionReason::RateLimited => "rate-limited",
            AdmissionReason::HumanityCheckFailed => "humanity-check-failed",
        }
    }
}

/// Outcome of the gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: AdmissionReason,
    pub retry_after_seconds: Option<u64>,
    pub rate_limit: Option<RateLimitOutcome>,
}

impl AdmissionDecision {
    fn allow(rate_limit: Option<RateLimitOutcome>) -> Self {
        Self {
            allowed: true,
            reason: AdmissionReason::Ok,
            retry_after_seconds: None,
            rate_limit,
        }
    }

    fn reject(reason: AdmissionReason) -> Self {
        Self {
            allowed: false,
            reason,
            retry_after_seconds: None,
            rate_limit: None,
        }
    }

    /// The error response for a rejected request, `None` when allowed.
    pub fn into_error(self) -> Option<AppError> {
        match self.reason {
            AdmissionReason::Ok => None,
            AdmissionReason::OriginDenied => Some(AppError::OriginDenied),
            AdmissionReason::HumanityCheckFailed => Some(AppError::HumanityCheckFailed),
            AdmissionReason::RateLimited => {
                let retry_after_secs = self.retry_after_seconds.unwrap_or(1);
                let (limit, remaining, reset_at_secs) = match self.rate_limit {
                    Some(outcome) => (outcome.limit, outcome.remaining, outcome.reset_at_secs()),
                    None => (
                        0,
                        0,
                        chrono::Utc::now().timestamp() + retry_after_secs as i64,
                    ),
                };
                Some(AppError::RateLimited {
                    limit,
                    remaining,
                    reset_at_secs,
                    retry_after_secs,
                })
            }
        }
    }
}

/// What the gate needs to know about one request.
#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest {
    pub origin: Option<String>,
    pub client_key: String,
    /// Only POST requests count against the rate limit.
    pub rate_limited: bool,
    pub humanity_token: Option<String>,
}

pub struct AdmissionGate {
    allowed_origins: Vec<String>,
    rate_limiter: RateLimiter,
    verifier: HumanityVerifier,
    environment: Environment,
    max_body_bytes: usize,
}

impl AdmissionGate {
    pub fn new(
        allowed_origins: Vec<String>,
        rate_limiter: RateLimiter,
        verifier: HumanityVerifier,
        environment: Environment,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            allowed_origins: allowed_origins
                .into_iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
            rate_limiter,
            verifier,
            environment,
            max_body_bytes,
        }
    }

    /// Build the gate from application configuration, sharing `client` for
    /// the rate-limit store and the verification service.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        Self::new(
            config.admission.allowed_origins.clone(),
            RateLimiter::from_config(&config.admission.rate_limit, client.clone()),
            HumanityVerifier::new(client, &config.admission.humanity),
            config.environment,
            config.server.max_body_bytes,
        )
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                self.allowed_origins.iter().any(|o| o == origin)
            }
        }
    }

    /// Run every check in order and decide.
    pub async fn evaluate(&self, request: &AdmissionRequest) -> AdmissionDecision {
        match self.evaluate_headers(request).await {
            Ok(rate_limit) => self.evaluate_humanity(request, rate_limit).await,
            Err(rejected) => rejected,
        }
    }

    /// Origin and rate-limit checks. Both need only the request headers, so
    /// callers can run them before reading the body.
    ///
    /// On success returns the rate-limit outcome to carry into
    /// [`evaluate_humanity`](Self::evaluate_humanity).
    pub async fn evaluate_headers(
        &self,
        request: &AdmissionRequest,
    ) -> Result<Option<RateLimitOutcome>, AdmissionDecision> {
        self.check_headers(request).await.map_err(record_rejection)
    }

    pub async fn evaluate_humanity(
        &self,
        request: &AdmissionRequest,
        rate_limit: Option<RateLimitOutcome>,
    ) -> AdmissionDecision {
        let decision = self.check_humanity(request, rate_limit).await;
        if decision.allowed {
            decision
        } else {
            record_rejection(decision)
        }
    }

    async fn check_headers(
        &self,
        request: &AdmissionRequest,
    ) -> Result<Option<RateLimitOutcome>, AdmissionDecision> {
        if !self.origin_allowed(request.origin.as_deref()) {
            tracing::warn!(
                origin = request.origin.as_deref().unwrap_or_default(),
                "Request blocked by origin check"
            );
            return Err(AdmissionDecision::reject(AdmissionReason::OriginDenied));
        }

        if !request.rate_limited {
            return Ok(None);
        }

        match self.rate_limiter.check(&request.client_key).await {
            RateLimitCheck::Checked(outcome) if outcome.allowed => Ok(Some(outcome)),
            RateLimitCheck::Checked(outcome) => {
                tracing::warn!(
                    client = %request.client_key,
                    limit = outcome.limit,
                    reset_at = outcome.reset_at_secs(),
                    "Rate limit exceeded"
                );
                let now_ms = chrono::Utc::now().timestamp_millis();
                Err(AdmissionDecision {
                    allowed: false,
                    reason: AdmissionReason::RateLimited,
                    retry_after_seconds: Some(outcome.retry_after_secs(now_ms)),
                    rate_limit: Some(outcome),
                })
            }
            RateLimitCheck::Unavailable(reason) => {
                if self.environment.is_production() {
                    tracing::error!(
                        reason = %reason,
                        "Rate limiting unavailable in production; rejecting request"
                    );
                    let window = self.rate_limiter.window();
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    return Err(AdmissionDecision {
                        allowed: false,
                        reason: AdmissionReason::RateLimited,
                        retry_after_seconds: Some((window.window_ms / 1000).max(1) as u64),
                        rate_limit: Some(RateLimitOutcome {
                            allowed: false,
                            remaining: 0,
                            limit: window.limit,
                            reset_at_ms: now_ms + window.window_ms,
                        }),
                    });
                }
                tracing::warn!(
                    reason = %reason,
                    "Rate limiting unavailable; allowing request outside production"
                );
                Ok(None)
            }
        }
    }

    async fn check_humanity(
        &self,
        request: &AdmissionRequest,
        rate_limit: Option<RateLimitOutcome>,
    ) -> AdmissionDecision {
        let token = request.humanity_token.as_deref().unwrap_or_default();
        let remote_ip = (request.client_key != ANONYMOUS_CLIENT).then_some(request.client_key.as_str());
        match self.verifier.verify(token, remote_ip).await {
            HumanityVerdict::Verified => AdmissionDecision::allow(rate_limit),
            HumanityVerdict::Rejected(reason) => {
                tracing::warn!(reason = %reason, "reCAPTCHA verification failed");
                AdmissionDecision::reject(AdmissionReason::HumanityCheckFailed)
            }
            HumanityVerdict::NotConfigured => {
                if self.environment.is_production() {
                    tracing::error!("reCAPTCHA secret not configured in production; rejecting request");
                    AdmissionDecision::reject(AdmissionReason::HumanityCheckFailed)
                } else {
                    tracing::warn!("reCAPTCHA secret not configured; skipping verification");
                    AdmissionDecision::allow(rate_limit)
                }
            }
        }
    }
}

fn record_rejection(decision: AdmissionDecision) -> AdmissionDecision {
    get_metrics()
        .admission_rejections
        .with_label_values(&[decision.reason.as_str()])
        .inc();
    decision
}
