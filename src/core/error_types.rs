//! Shared constants for structured API errors.

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_CONFIGURATION: &str = "configuration_error";
pub const ERROR_TYPE_UPSTREAM: &str = "upstream_error";
pub const ERROR_TYPE_ADMISSION: &str = "admission_error";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_error";

pub const ERROR_CODE_PROVIDER_NOT_CONFIGURED: &str = "provider_not_configured";
pub const ERROR_CODE_PROVIDER_DISABLED: &str = "provider_disabled";
pub const ERROR_CODE_ORIGIN_DENIED: &str = "origin-denied";
pub const ERROR_CODE_RATE_LIMITED: &str = "rate-limited";
pub const ERROR_CODE_HUMANITY_CHECK_FAILED: &str = "humanity-check-failed";

/// Longest upstream error body echoed back to the caller.
pub const UPSTREAM_ERROR_SNIPPET_CHARS: usize = 200;

/// Truncate an upstream error body for inclusion in an error message.
pub fn truncate_snippet(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(UPSTREAM_ERROR_SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
