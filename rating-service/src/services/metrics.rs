//! Metrics module for rating-service.
//! Provides Prometheus metrics for ingest, rating, cycle and forecast
//! operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Store operation duration histogram
pub static STORE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "rating_store_op_duration_seconds",
            "Store operation duration"
        ),
        &["operation"]
    )
    .expect("Failed to register STORE_OP_DURATION")
});

/// Ingested usage records counter
pub static USAGE_INGESTED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rated usage records counter
pub static RECORDS_RATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rating failures counter for alerting
pub static RATING_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Processed billing cycles counter
pub static CYCLES_PROCESSED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Generated forecasts counter
pub static FORECASTS_GENERATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    USAGE_INGESTED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_usage_ingested_total",
                "Total ingested usage records by type and outcome"
            ),
            &["usage_type", "outcome"]
        )
        .expect("Failed to register USAGE_INGESTED_TOTAL")
    });

    RECORDS_RATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_records_rated_total",
                "Total rated usage records by terminal rating status"
            ),
            &["rating_status"]
        )
        .expect("Failed to register RECORDS_RATED_TOTAL")
    });

    RATING_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_failures_total",
                "Total rating failures by reason"
            ),
            &["reason"]
        )
        .expect("Failed to register RATING_FAILURES_TOTAL")
    });

    CYCLES_PROCESSED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_cycles_processed_total",
                "Total billing cycle processing attempts by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register CYCLES_PROCESSED_TOTAL")
    });

    FORECASTS_GENERATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_forecasts_generated_total",
                "Total cost forecasts generated by model"
            ),
            &["model"]
        )
        .expect("Failed to register FORECASTS_GENERATED_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("rating_errors_total", "Total errors by component"),
            &["component", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });
}

/// Record an ingested usage record.
pub fn record_usage_ingested(usage_type: &str, outcome: &str) {
    if let Some(counter) = USAGE_INGESTED_TOTAL.get() {
        counter.with_label_values(&[usage_type, outcome]).inc();
    }
}

/// Record a rated usage record.
pub fn record_rated(rating_status: &str) {
    if let Some(counter) = RECORDS_RATED_TOTAL.get() {
        counter.with_label_values(&[rating_status]).inc();
    }
}

/// Record a rating failure.
pub fn record_rating_failure(reason: &str) {
    if let Some(counter) = RATING_FAILURES_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

/// Record a billing cycle processing outcome.
pub fn record_cycle_processed(outcome: &str) {
    if let Some(counter) = CYCLES_PROCESSED_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a generated forecast batch.
pub fn record_forecast_generated(model: &str) {
    if let Some(counter) = FORECASTS_GENERATED_TOTAL.get() {
        counter.with_label_values(&[model]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(component: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[component, operation]).inc();
    }
}

/// Render all registered metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
