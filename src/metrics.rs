//! Prometheus metrics for label-history reconciliation
//!
//! Counters track how well histories compress and which failures are being
//! skipped; a gauge reports the size of the last alignment.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

use crate::error::Error;

lazy_static! {
    // === Label histories ===

    /// Appends by outcome: `compressed` (range widened) or `diff` (new step)
    pub static ref LABEL_APPENDS_TOTAL: CounterVec = register_counter_vec!(
        "labels_appends_total",
        "Total label map appends by outcome",
        &["outcome"]
    ).expect("labels_appends_total registers once");

    /// Diffs recorded
    pub static ref LABEL_DIFFS_TOTAL: Counter = register_counter!(
        "labels_diffs_total",
        "Total label diffs recorded"
    ).expect("labels_diffs_total registers once");

    // === Errors ===

    /// Skipped failures by kind and operation
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "labels_errors_total",
        "Total errors by type and operation",
        &["error_type", "operation"]
    ).expect("labels_errors_total registers once");

    // === Alignment ===

    /// Buckets produced by the last alignment
    pub static ref REARRANGE_BUCKETS: Gauge = register_gauge!(
        "rearrange_buckets",
        "Number of buckets produced by the last alignment"
    ).expect("rearrange_buckets registers once");
}

/// Register every metric with the default registry
pub fn init() {
    lazy_static::initialize(&LABEL_APPENDS_TOTAL);
    lazy_static::initialize(&LABEL_DIFFS_TOTAL);
    lazy_static::initialize(&ERRORS_TOTAL);
    lazy_static::initialize(&REARRANGE_BUCKETS);

    tracing::info!("Metrics system initialized");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a label map append
#[inline]
pub fn record_label_append(new_diff: bool) {
    let outcome = if new_diff { "diff" } else { "compressed" };
    LABEL_APPENDS_TOTAL.with_label_values(&[outcome]).inc();
    if new_diff {
        LABEL_DIFFS_TOTAL.inc();
    }
}

/// Record a skipped failure
#[inline]
pub fn record_error(error: &Error, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error.kind(), operation])
        .inc();
}

/// Update the bucket count of the last alignment
#[inline]
pub fn record_rearrange_buckets(count: usize) {
    REARRANGE_BUCKETS.set(count as f64);
}
