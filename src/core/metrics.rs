//! Prometheus metrics for the translation gateway.
//!
//! Tracks request volume and latency, admission rejections, streamed
//! increments, client disconnects and upstream failures per provider.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, Encoder, GaugeVec,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, provider and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Requests turned away by the admission gate, by reason
    pub admission_rejections: IntCounterVec,

    /// Text increments forwarded to clients, by provider
    pub stream_increments: IntCounterVec,

    /// Streams abandoned by the client before the terminal marker
    pub client_disconnects: IntCounterVec,

    /// Upstream failures by provider and status ("transport" when no status)
    pub upstream_errors: IntCounterVec,

    /// Time until the first increment reached the client
    pub ttft: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; later calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "glossa_requests_total",
            "Total number of requests",
            &["method", "endpoint", "provider", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "glossa_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint", "provider"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "glossa_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let admission_rejections = register_int_counter_vec!(
            "glossa_admission_rejections_total",
            "Requests rejected by the admission gate",
            &["reason"]
        )
        .expect("Failed to register admission_rejections metric");

        let stream_increments = register_int_counter_vec!(
            "glossa_stream_increments_total",
            "Text increments forwarded to clients",
            &["provider"]
        )
        .expect("Failed to register stream_increments metric");

        let client_disconnects = register_int_counter_vec!(
            "glossa_client_disconnects_total",
            "Streams cancelled because the client went away",
            &["provider"]
        )
        .expect("Failed to register client_disconnects metric");

        let upstream_errors = register_int_counter_vec!(
            "glossa_upstream_errors_total",
            "Upstream provider failures",
            &["provider", "status"]
        )
        .expect("Failed to register upstream_errors metric");

        let ttft = register_histogram_vec!(
            "glossa_ttft_seconds",
            "Time to first translated increment in seconds",
            &["provider"],
            vec![0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0]
        )
        .expect("Failed to register ttft metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            admission_rejections,
            stream_increments,
            client_disconnects,
            upstream_errors,
            ttft,
        }
    })
}

/// Get the global metrics instance, registering it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
