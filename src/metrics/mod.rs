//! Metrics module
//!
//! Prometheus counters and histograms for the upload pipeline, exposed by
//! [`server::MetricsServer`].

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "tos3_uploads_total",
        "Total number of uploads",
        &["bucket", "mode", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "tos3_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "tos3_upload_duration_seconds",
        "End-to-end upload duration in seconds",
        &["bucket", "mode"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Store metrics
    pub static ref PUT_OBJECT_DURATION: HistogramVec = register_histogram_vec!(
        "tos3_put_object_duration_seconds",
        "Put-object call duration in seconds",
        &["bucket"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tos3_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bucket: &str, mode: &str, bytes: u64) {
    UPLOADS_TOTAL
        .with_label_values(&[bucket, mode, "success"])
        .inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(bucket: &str, mode: &str) {
    UPLOADS_TOTAL
        .with_label_values(&[bucket, mode, "failure"])
        .inc();
}

/// Record upload duration
pub fn record_upload_duration(bucket: &str, mode: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[bucket, mode])
        .observe(duration_secs);
}

/// Record put-object call duration
pub fn record_put_duration(bucket: &str, duration_secs: f64) {
    PUT_OBJECT_DURATION
        .with_label_values(&[bucket])
        .observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
