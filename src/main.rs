//! Glossa Gateway - Main entry point
//!
//! This binary loads configuration, initializes logging and metrics, and
//! serves the translation API until interrupted.

use anyhow::Result;
use chrono::Local;
use glossa_gateway::{
    build_router,
    core::{init_metrics, logging::json_logs_requested},
    AppConfig, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| detect_cpu_limit().unwrap_or(1));

    println!("Tokio runtime: using {} worker threads", worker_threads);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Timestamps in the local timezone (respects TZ)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,glossa_gateway=debug".to_string());

    // Appended last so a bare RUST_LOG=trace cannot re-enable HTTP library noise
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    let json = json_logs_requested(std::env::var("LOG_FORMAT").ok().as_deref());
    let no_color = std::env::var("NO_COLOR").is_ok();

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_timer(LocalTime),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTime)
                    .with_ansi(!no_color),
            )
            .init();
    }
}

async fn async_main() -> Result<()> {
    init_tracing();
    init_metrics();

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration file");
            AppConfig::load(&path)?
        }
        Err(_) => AppConfig::from_env()?,
    };

    let http_client = create_http_client(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = Arc::new(AppState::new(config, http_client));
    state.provider_service.log_providers();
    tracing::info!(
        origins = ?state.admission.allowed_origins(),
        "Admission gate configured"
    );

    let app = build_router(state);

    tracing::info!("Starting Glossa Gateway on {}", addr);
    tracing::info!("Translation API: /api/translate, /api/translate-{{gemini,deepseek,gpt,tgi}}");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// HTTP client with connection pooling, shared by every upstream call.
fn create_http_client(config: &AppConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Detect CPU limit from cgroup (for containerized environments)
fn detect_cpu_limit() -> Option<usize> {
    // cgroup v2
    if let Ok(max) = std::fs::read_to_string("/sys/fs/cgroup/cpu.max") {
        let parts: Vec<&str> = max.split_whitespace().collect();
        if parts.len() == 2 {
            if let (Ok(quota), Ok(period)) = (parts[0].parse::<i64>(), parts[1].parse::<i64>()) {
                if quota > 0 {
                    let cores = ((quota as f64 / period as f64).ceil() as usize).max(1);
                    println!("Detected CPU limit from cgroup v2: {} cores", cores);
                    return Some(cores);
                }
            }
        }
    }

    // cgroup v1
    let quota = std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_quota_us")
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    let period = std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_period_us")
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;

    if quota > 0 {
        let cores = ((quota as f64 / period as f64).ceil() as usize).max(1);
        println!("Detected CPU limit from cgroup v1: {} cores", cores);
        Some(cores)
    } else {
        None
    }
}
