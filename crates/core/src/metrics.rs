//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (outcomes, duration, size remediation)
//! - Acquisition (downloads)
//! - Admission gate and isolated workers
//! - Temp file cleanup

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Finished jobs by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaforge_jobs_total", "Total jobs finished"),
        &["outcome"], // "completed", "user_error", "transient", "failed"
    )
    .unwrap()
});

/// Job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("mediaforge_job_duration_seconds", "Duration of jobs")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["transform"],
    )
    .unwrap()
});

/// Output size remediation passes by result.
pub static SIZE_REMEDIATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaforge_size_remediations_total",
            "Shrink passes applied to oversized results",
        ),
        &["result"], // "fits", "too_large"
    )
    .unwrap()
});

// =============================================================================
// Acquisition
// =============================================================================

/// Downloads started total.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediaforge_downloads_started_total", "Total downloads started").unwrap()
});

/// Downloads failed by reason.
pub static DOWNLOADS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaforge_downloads_failed_total", "Total downloads that failed"),
        &["reason"], // "too_large", "size_unknown", "http", "request"
    )
    .unwrap()
});

/// Bytes written by downloads.
pub static DOWNLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediaforge_download_bytes_total", "Total bytes downloaded").unwrap()
});

// =============================================================================
// Admission and workers
// =============================================================================

/// Jobs waiting for an admission slot.
pub static GATE_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mediaforge_gate_queued", "Jobs waiting for a slot").unwrap()
});

/// Jobs holding an admission slot.
pub static GATE_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mediaforge_gate_active", "Jobs running their transform").unwrap()
});

/// Isolated worker invocations by result.
pub static WORKER_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaforge_worker_invocations_total",
            "Isolated worker invocations",
        ),
        &["result"], // "ok", "transform_error", "crashed"
    )
    .unwrap()
});

// =============================================================================
// Temp files
// =============================================================================

/// Temp files removed by scope close.
pub static TEMP_FILES_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaforge_temp_files_removed_total",
        "Temp files deleted on scope close",
    )
    .unwrap()
});

/// Full temp directory purges after a storage-full error.
pub static TEMP_PURGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediaforge_temp_purges_total",
        "Temp directory purges after running out of space",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(SIZE_REMEDIATIONS.clone()),
        // Acquisition
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(DOWNLOAD_BYTES.clone()),
        // Admission and workers
        Box::new(GATE_QUEUED.clone()),
        Box::new(GATE_ACTIVE.clone()),
        Box::new(WORKER_INVOCATIONS.clone()),
        // Temp files
        Box::new(TEMP_FILES_REMOVED.clone()),
        Box::new(TEMP_PURGES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JOBS_TOTAL.with_label_values(&["completed"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"mediaforge_jobs_total".to_string()));
    }
}
