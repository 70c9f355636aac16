//! Metrics module
//!
//! Prometheus counters and histograms for object operations and batch runs,
//! registered in the default registry and served by [`server::MetricsServer`].

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Object metrics
    pub static ref OBJECT_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "filelink_object_operations_total",
        "Total single-object operations",
        &["operation", "status"]
    ).unwrap();

    pub static ref OBJECT_BYTES_TOTAL: Counter = register_counter!(
        "filelink_object_bytes_total",
        "Total bytes stored"
    ).unwrap();

    pub static ref OBJECT_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "filelink_object_operation_duration_seconds",
        "Single-object operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Batch metrics
    pub static ref BATCH_RUNS_TOTAL: CounterVec = register_counter_vec!(
        "filelink_batch_runs_total",
        "Total batch runs",
        &["operation", "status"]
    ).unwrap();

    pub static ref BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "filelink_batch_size",
        "Number of work items per batch",
        &["operation"],
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    pub static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "filelink_batch_duration_seconds",
        "Batch run duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref BATCH_SUPPRESSED_FAILURES: CounterVec = register_counter_vec!(
        "filelink_batch_suppressed_failures_total",
        "Item failures dropped because another item failed first",
        &["operation"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "filelink_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record the outcome and duration of one object operation
pub fn record_object_operation(operation: &str, success: bool, duration_secs: f64) {
    OBJECT_OPERATIONS_TOTAL
        .with_label_values(&[operation, status_label(success)])
        .inc();
    OBJECT_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record bytes written to the object store
pub fn record_object_bytes(bytes: u64) {
    OBJECT_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a finished batch run
pub fn record_batch_run(operation: &str, size: usize, success: bool, duration_secs: f64) {
    BATCH_RUNS_TOTAL
        .with_label_values(&[operation, status_label(success)])
        .inc();
    BATCH_SIZE.with_label_values(&[operation]).observe(size as f64);
    BATCH_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a failure that lost the race for the first-error slot
pub fn record_suppressed_failure(operation: &str) {
    BATCH_SUPPRESSED_FAILURES
        .with_label_values(&[operation])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
