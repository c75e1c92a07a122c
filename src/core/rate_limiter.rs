//! Sliding-window rate limiting keyed by client identifier.
//!
//! Counts live in a shared [`RateLimitStore`]. Each hit estimates the number of
//! requests in the trailing window by weighting the previous fixed window by
//! the fraction of it still inside the window, then adds the current count.
//! A hit that would reach the limit is rejected without being counted.

use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::config::{RateLimitConfig, RateLimitStoreKind};

/// Key used when a request carries no client address headers.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

const KEY_PREFIX: &str = "glossa:ratelimit";

/// In-memory stores purge stale keys once they hold this many entries.
const MEMORY_PURGE_THRESHOLD: usize = 10_000;

/// Result of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at_ms: i64,
}

impl RateLimitOutcome {
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms.div_euclid(1000)
    }

    /// Whole seconds until the current window rolls over, at least one.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.reset_at_ms - now_ms).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    }
}

/// Window geometry shared by every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    pub limit: u32,
    pub window_ms: i64,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: (window.as_millis() as i64).max(1),
        }
    }

    pub fn window_index(&self, now_ms: i64) -> i64 {
        now_ms.div_euclid(self.window_ms)
    }

    pub fn reset_at_ms(&self, now_ms: i64) -> i64 {
        (self.window_index(now_ms) + 1) * self.window_ms
    }

    /// Requests attributed to the trailing window before counting this one.
    pub fn estimate(&self, previous: u32, current: u32, now_ms: i64) -> u32 {
        let elapsed = now_ms.rem_euclid(self.window_ms) as f64 / self.window_ms as f64;
        let weighted = (previous as f64 * (1.0 - elapsed)).floor() as u32;
        weighted.saturating_add(current)
    }

    /// Decide a hit given the stored counts. `current` must not yet include it.
    pub fn evaluate(&self, previous: u32, current: u32, now_ms: i64) -> RateLimitOutcome {
        let estimated = self.estimate(previous, current, now_ms);
        let reset_at_ms = self.reset_at_ms(now_ms);
        if estimated >= self.limit {
            RateLimitOutcome {
                allowed: false,
                remaining: 0,
                limit: self.limit,
                reset_at_ms,
            }
        } else {
            RateLimitOutcome {
                allowed: true,
                remaining: self.limit - estimated - 1,
                limit: self.limit,
                reset_at_ms,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store timed out")]
    Timeout,
    #[error("rate limit store transport error: {0}")]
    Transport(String),
    #[error("rate limit store protocol error: {0}")]
    Protocol(String),
}

/// Shared counter storage. `hit` must count and decide atomically.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(
        &self,
        key: &str,
        window: SlidingWindow,
        now_ms: i64,
    ) -> Result<RateLimitOutcome, StoreError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowCounters {
    window_index: i64,
    previous: u32,
    current: u32,
}

/// Process-local store. Atomic per key under the map's entry lock.
#[derive(Default)]
pub struct InMemoryStore {
    counters: DashMap<String, WindowCounters>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn hit_sync(&self, key: &str, window: SlidingWindow, now_ms: i64) -> RateLimitOutcome {
        let index = window.window_index(now_ms);
        let outcome = {
            let mut entry = self.counters.entry(key.to_string()).or_insert(WindowCounters {
                window_index: index,
                ..Default::default()
            });
            let counters = entry.value_mut();
            if counters.window_index != index {
                counters.previous = if counters.window_index + 1 == index {
                    counters.current
                } else {
                    0
                };
                counters.current = 0;
                counters.window_index = index;
            }
            let outcome = window.evaluate(counters.previous, counters.current, now_ms);
            if outcome.allowed {
                counters.current += 1;
            }
            outcome
        };

        if self.counters.len() > MEMORY_PURGE_THRESHOLD {
            self.counters.retain(|_, c| c.window_index + 1 >= index);
        }

        outcome
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn hit(
        &self,
        key: &str,
        window: SlidingWindow,
        now_ms: i64,
    ) -> Result<RateLimitOutcome, StoreError> {
        Ok(self.hit_sync(key, window, now_ms))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Counts and decides in one round trip; returns remaining, or -1 when limited.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local currentKey = KEYS[1]
local previousKey = KEYS[2]
local limit = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])

local current = tonumber(redis.call("GET", currentKey) or "0")
local previous = tonumber(redis.call("GET", previousKey) or "0")
local elapsed = (now % window) / window
previous = math.floor((1 - elapsed) * previous)

if previous + current >= limit then
  return -1
end

local newValue = redis.call("INCR", currentKey)
if newValue == 1 then
  redis.call("PEXPIRE", currentKey, window * 2 + 1000)
end
return limit - (newValue + previous)
"#;

#[derive(Debug, Deserialize)]
struct UpstashResponse {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Redis over the Upstash REST API, evaluated server-side for fleet-wide atomicity.
pub struct UpstashStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl UpstashStore {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn window_key(client_key: &str, index: i64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, client_key, index)
    }
}

#[async_trait]
impl RateLimitStore for UpstashStore {
    async fn hit(
        &self,
        key: &str,
        window: SlidingWindow,
        now_ms: i64,
    ) -> Result<RateLimitOutcome, StoreError> {
        let index = window.window_index(now_ms);
        let command = json!([
            "EVAL",
            SLIDING_WINDOW_SCRIPT,
            "2",
            Self::window_key(key, index),
            Self::window_key(key, index - 1),
            window.limit.to_string(),
            now_ms.to_string(),
            window.window_ms.to_string(),
        ]);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body: UpstashResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(format!("status {}: {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(StoreError::Protocol(error));
        }
        if !status.is_success() {
            return Err(StoreError::Protocol(format!("status {}", status)));
        }

        let remaining = body
            .result
            .as_ref()
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| StoreError::Protocol("missing numeric result".to_string()))?;

        Ok(RateLimitOutcome {
            allowed: remaining >= 0,
            remaining: remaining.max(0) as u32,
            limit: window.limit,
            reset_at_ms: window.reset_at_ms(now_ms),
        })
    }

    fn name(&self) -> &'static str {
        "upstash"
    }
}

/// What the limiter could determine for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitCheck {
    Checked(RateLimitOutcome),
    /// No store configured, or the store failed or timed out.
    Unavailable(String),
}

pub struct RateLimiter {
    store: Option<Arc<dyn RateLimitStore>>,
    window: SlidingWindow,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn RateLimitStore>>, window: SlidingWindow, timeout: Duration) -> Self {
        Self {
            store,
            window,
            timeout,
        }
    }

    /// Build the limiter described by configuration, sharing the pooled HTTP client.
    pub fn from_config(config: &RateLimitConfig, client: reqwest::Client) -> Self {
        let window = SlidingWindow::new(config.requests, Duration::from_secs(config.window_secs));
        let timeout = Duration::from_millis(config.timeout_ms);

        let store: Option<Arc<dyn RateLimitStore>> = match config.store {
            RateLimitStoreKind::None => None,
            RateLimitStoreKind::Memory => Some(Arc::new(InMemoryStore::new())),
            RateLimitStoreKind::Upstash => {
                match (config.upstash_url.as_deref(), config.upstash_token.as_deref()) {
                    (Some(url), Some(token)) => {
                        Some(Arc::new(UpstashStore::new(client, url, token)))
                    }
                    _ => {
                        tracing::warn!(
                            "Upstash rate limit store selected without URL and token; limiter disabled"
                        );
                        None
                    }
                }
            }
        };

        if let Some(store) = &store {
            tracing::info!(
                store = store.name(),
                limit = window.limit,
                window_ms = window.window_ms,
                "Rate limiter configured"
            );
        }

        Self::new(store, window, timeout)
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub fn window(&self) -> SlidingWindow {
        self.window
    }

    pub async fn check(&self, key: &str) -> RateLimitCheck {
        self.check_at(key, chrono::Utc::now().timestamp_millis()).await
    }

    pub async fn check_at(&self, key: &str, now_ms: i64) -> RateLimitCheck {
        let Some(store) = &self.store else {
            return RateLimitCheck::Unavailable("no rate limit store configured".to_string());
        };

        match tokio::time::timeout(self.timeout, store.hit(key, self.window, now_ms)).await {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    client = key,
                    allowed = outcome.allowed,
                    remaining = outcome.remaining,
                    "Rate limit checked"
                );
                RateLimitCheck::Checked(outcome)
            }
            Ok(Err(e)) => RateLimitCheck::Unavailable(e.to_string()),
            Err(_) => RateLimitCheck::Unavailable(StoreError::Timeout.to_string()),
        }
    }
}

/// Client identifier: first `X-Forwarded-For` entry, else `X-Real-IP`, else anonymous.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}
