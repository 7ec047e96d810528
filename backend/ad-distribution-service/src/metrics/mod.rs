//! Ad Distribution Metrics
//!
//! Prometheus metrics for impression accounting, ad selection and the fairness refresh job

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

use crate::models::Placement;

static IMPRESSIONS_RECORDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ad_impressions_recorded_total",
        "Impression write attempts by placement and outcome",
        &["placement", "status"]
    )
    .expect("Failed to register impressions recorded metric")
});

static SELECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ad_selections_total",
        "Ad selection calls by placement",
        &["placement"]
    )
    .expect("Failed to register selections metric")
});

static SELECTION_DEGRADED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ad_selection_degraded_total",
        "Selections served with neutral fairness or an empty fallback",
        &["reason"]
    )
    .expect("Failed to register degraded selection metric")
});

static SELECTION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ad_selection_duration_seconds",
        "Duration of ad selection calls",
        &["placement"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register selection duration metric")
});

static FAIRNESS_REFRESH_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ad_fairness_refresh_runs_total",
        "Fairness refresh cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register fairness refresh runs metric")
});

pub fn record_impression(placement: Placement, status: &str) {
    IMPRESSIONS_RECORDED_TOTAL
        .with_label_values(&[placement.as_str(), status])
        .inc();
}

pub fn record_selection(placement: Placement, duration: Duration) {
    SELECTIONS_TOTAL
        .with_label_values(&[placement.as_str()])
        .inc();
    SELECTION_DURATION_SECONDS
        .with_label_values(&[placement.as_str()])
        .observe(duration.as_secs_f64());
}

pub fn record_degraded(reason: &str) {
    SELECTION_DEGRADED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_refresh_run(status: &str) {
    FAIRNESS_REFRESH_RUNS_TOTAL.with_label_values(&[status]).inc();
}

/// Text exposition of the default registry
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
