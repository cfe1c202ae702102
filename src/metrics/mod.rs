//! Metrics module
//!
//! Prometheus counters and histograms for transfer outcomes, registered in
//! the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "s3_facade_uploads_total",
        "Total number of uploads",
        &["strategy", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "s3_facade_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "s3_facade_upload_duration_seconds",
        "Upload duration in seconds",
        &["strategy"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "s3_facade_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    pub static ref MULTIPART_ABORTS: Counter = register_counter!(
        "s3_facade_multipart_aborts_total",
        "Multipart uploads ended by a failure"
    ).unwrap();

    // Download metrics
    pub static ref DOWNLOADS_TOTAL: CounterVec = register_counter_vec!(
        "s3_facade_downloads_total",
        "Total number of downloads",
        &["delivery", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "s3_facade_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(strategy: &str, bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&[strategy, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_DURATION
        .with_label_values(&[strategy])
        .observe(duration_secs);
}

/// Record a failed upload
pub fn record_upload_failure(strategy: &str, error_type: &str) {
    UPLOADS_TOTAL.with_label_values(&[strategy, "failure"]).inc();
    record_error(error_type);
}

/// Record an upload skipped because the source was empty
pub fn record_upload_skipped() {
    UPLOADS_TOTAL.with_label_values(&["none", "skipped"]).inc();
}

/// Record the part count of a completed multipart upload
pub fn record_multipart_parts(parts_count: usize) {
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a multipart upload that ended in an abort
pub fn record_multipart_abort() {
    MULTIPART_ABORTS.inc();
}

/// Record a download
pub fn record_download(delivery: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    DOWNLOADS_TOTAL.with_label_values(&[delivery, status]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Register every metric, so a dump lists them even before first use
pub fn register_all() {
    lazy_static::initialize(&UPLOADS_TOTAL);
    lazy_static::initialize(&UPLOAD_BYTES_TOTAL);
    lazy_static::initialize(&UPLOAD_DURATION);
    lazy_static::initialize(&MULTIPART_PARTS);
    lazy_static::initialize(&MULTIPART_ABORTS);
    lazy_static::initialize(&DOWNLOADS_TOTAL);
    lazy_static::initialize(&ERRORS_TOTAL);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    register_all();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
