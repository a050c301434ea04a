//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue manager (admissions, outcomes, requeues, queue wait)
//! - Processing pipeline (duration by result)
//! - Executor pool (fallbacks to inline units, aborted calls)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Queue Manager
// =============================================================================

/// Jobs admitted into the executor pool.
pub static JOBS_ADMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("jpegstamp_jobs_admitted_total", "Total jobs admitted for processing")
        .unwrap()
});

/// Settled executions by reconciliation result.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jpegstamp_job_outcomes_total", "Settled executions by result"),
        &["result"], // "done", "warning", "error", "ended", "requeued"
    )
    .unwrap()
});

/// Requeues by cause.
pub static REQUEUES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jpegstamp_requeues_total", "Jobs returned to the queue"),
        &["cause"], // "generation", "aborted", "commit_rejected"
    )
    .unwrap()
});

/// Time from job creation or requeue to admission.
pub static QUEUE_WAIT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "jpegstamp_queue_wait_seconds",
            "Time from job creation or requeue to admission",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Pipeline duration in seconds.
pub static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "jpegstamp_pipeline_duration_seconds",
            "Duration of a single pipeline call",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["result"], // "success" or an error code
    )
    .unwrap()
});

// =============================================================================
// Executor Pool
// =============================================================================

/// Isolated units replaced by inline units.
pub static EXECUTOR_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "jpegstamp_executor_fallbacks_total",
            "Execution units that fell back to inline execution",
        ),
        &["reason"], // "create_failed", "probe_failed", "unit_dead"
    )
    .unwrap()
});

/// Pool-wide cancellations.
pub static POOL_CANCELLATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jpegstamp_pool_cancellations_total",
        "Pool-wide cancel-all operations",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(JOBS_ADMITTED.clone()),
        Box::new(JOB_OUTCOMES.clone()),
        Box::new(REQUEUES.clone()),
        Box::new(QUEUE_WAIT.clone()),
        // Pipeline
        Box::new(PIPELINE_DURATION.clone()),
        // Pool
        Box::new(EXECUTOR_FALLBACKS.clone()),
        Box::new(POOL_CANCELLATIONS.clone()),
    ]
}
