//! Metrics and telemetry for docvault
//!
//! Prometheus-compatible metrics for document operations, backend I/O and
//! best-effort cleanup failures.

use crate::error::{DocError, DocResult};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== Document Metrics ==========

    /// Document store operations by operation and outcome
    pub static ref DOCUMENT_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docvault_document_operations_total",
        "Total number of document store operations",
        &["operation", "status"]
    )
    .unwrap();

    // ========== Backend Metrics ==========

    /// Backend calls by backend id, operation and outcome
    pub static ref BACKEND_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docvault_backend_operations_total",
        "Total number of storage backend operations",
        &["backend", "operation", "status"]
    )
    .unwrap();

    /// Backend call latency in seconds
    pub static ref BACKEND_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "docvault_backend_operation_duration_seconds",
        "Storage backend operation latencies in seconds",
        &["backend", "operation"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    /// Backend instances constructed by registries
    pub static ref BACKEND_INSTANCES_TOTAL: IntCounter = register_int_counter!(
        "docvault_backend_instances_total",
        "Number of storage backend instances constructed"
    )
    .unwrap();

    /// Swallowed failures during best-effort payload cleanup
    pub static ref CLEANUP_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docvault_cleanup_failures_total",
        "Total number of failed best-effort payload deletions",
        &["operation"]
    )
    .unwrap();
}

fn status_label<T>(result: &DocResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> DocResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| DocError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| DocError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}

/// Record the outcome of a document store operation
pub fn record_document_operation<T>(operation: &str, result: &DocResult<T>) {
    DOCUMENT_OPERATIONS_TOTAL
        .with_label_values(&[operation, status_label(result)])
        .inc();
}

/// Record a backend call
pub fn record_backend_operation<T>(
    backend: &str,
    operation: &str,
    result: &DocResult<T>,
    duration: f64,
) {
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation, status_label(result)])
        .inc();
    BACKEND_OPERATION_DURATION_SECONDS
        .with_label_values(&[backend, operation])
        .observe(duration);
}

/// Record a swallowed cleanup failure
pub fn record_cleanup_failure(operation: &str) {
    CLEANUP_FAILURES_TOTAL.with_label_values(&[operation]).inc();
}
