//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the jpegstamp server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Jobs by status and queue occupancy (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;

use jpegstamp_core::{JobStatus, JobStore, PreviewRegistry};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "jpegstamp_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jpegstamp_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jpegstamp_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Files accepted through the upload endpoint.
pub static UPLOADED_FILES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jpegstamp_uploaded_files_total",
        "Total files accepted for conversion",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jpegstamp_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jpegstamp_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jpegstamp_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jpegstamp_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics (collected dynamically)
// =============================================================================

/// Jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("jpegstamp_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Execution units in the pool.
pub static POOL_CAPACITY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("jpegstamp_pool_capacity", "Number of execution units").unwrap()
});

/// Jobs admitted and not yet settled.
pub static QUEUE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jpegstamp_queue_running",
        "Number of jobs currently admitted",
    )
    .unwrap()
});

/// Calls waiting inside the pool for an idle unit.
pub static POOL_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jpegstamp_pool_pending",
        "Number of calls waiting for an idle execution unit",
    )
    .unwrap()
});

/// Live preview handles.
pub static PREVIEWS_LIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("jpegstamp_previews_live", "Number of live preview handles").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(UPLOADED_FILES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Jobs and queue
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();
    registry.register(Box::new(POOL_CAPACITY.clone())).unwrap();
    registry.register(Box::new(QUEUE_RUNNING.clone())).unwrap();
    registry.register(Box::new(POOL_PENDING.clone())).unwrap();
    registry.register(Box::new(PREVIEWS_LIVE.clone())).unwrap();

    // Core metrics (queue manager, pipeline, executor pool)
    for metric in jpegstamp_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the live session.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.queue().status();
    POOL_CAPACITY.set(status.capacity as i64);
    QUEUE_RUNNING.set(status.running as i64);
    POOL_PENDING.set(status.pending as i64);

    PREVIEWS_LIVE.set(state.previews().len() as i64);

    let snapshot = state.store().snapshot();
    for job_status in JobStatus::ALL {
        JOBS_BY_STATUS
            .with_label_values(&[job_status.as_str()])
            .set(snapshot.count(job_status) as i64);
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static PREVIEW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"preview-\{id\}").unwrap());

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = PREVIEW_RE.replace_all(&result, "{handle}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
