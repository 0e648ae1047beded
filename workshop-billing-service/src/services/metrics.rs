//! Prometheus metrics for workshop-billing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// HTTP request counter by handler and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_http_requests_total",
        "Total number of HTTP requests",
        &["handler", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// Quotation state transitions by resulting status.
pub static QUOTATION_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_quotation_transitions_total",
        "Total number of quotation status transitions",
        &["status"] // draft, sent, approved, rejected, expired
    )
    .expect("Failed to register quotation_transitions_total")
});

/// Invoice counter by payment status reached.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_invoices_total",
        "Total number of invoices by payment status",
        &["status"]
    )
    .expect("Failed to register invoices_total")
});

pub static PAYMENTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("workshop_payments_total", "Total number of recorded payments")
        .expect("Failed to register payments_total")
});

pub static PAYMENT_AMOUNT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "workshop_payment_amount_total",
        "Total amount of recorded payments"
    )
    .expect("Failed to register payment_amount_total")
});

/// Documents handled by the batch sweeps.
pub static SWEEP_DOCUMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_sweep_documents_total",
        "Documents processed by the expiration and overdue sweeps",
        &["kind", "outcome"] // outcome: processed, skipped, error
    )
    .expect("Failed to register sweep_documents_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "workshop_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "workshop_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&QUOTATION_TRANSITIONS_TOTAL);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&SWEEP_DOCUMENTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
