//! Logging utilities with request and provider context.
//!
//! Request IDs and the active provider name live in task-local storage so that
//! every log line emitted while serving a translation can be correlated
//! without threading the values through each call.

tokio::task_local! {
    /// Task-local storage for the provider serving the current request.
    pub static PROVIDER_CONTEXT: String;
}

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Get the current provider name from context, if set.
///
/// Returns an empty string if no provider context is set.
pub fn get_provider_context() -> String {
    PROVIDER_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Whether log output should be JSON lines instead of human-readable text.
pub fn json_logs_requested(value: Option<&str>) -> bool {
    matches!(value.map(|v| v.trim().to_ascii_lowercase()).as_deref(), Some("json"))
}

/// Execute an async block with request context (request_id, provider).
///
/// ```ignore
/// with_request_context!(request_id, provider_name, async {
///     // handler logic here
/// })
/// ```
#[macro_export]
macro_rules! with_request_context {
    ($request_id:expr, $provider_name:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, async {
                $crate::core::logging::PROVIDER_CONTEXT
                    .scope($provider_name, $body)
                    .await
            })
            .await
    };
}
