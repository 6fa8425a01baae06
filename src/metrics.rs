//! Prometheus metrics
//!
//! Counts what happens to every webhook and every sync flow, so dropped
//! payloads show up even though the providers always get a 200.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: inbound webhooks by source and what became of them
    pub static ref WEBHOOK_EVENTS: CounterVec = register_counter_vec!(
        "cardhub_webhook_events_total",
        "Inbound webhooks by source and outcome",
        &["source", "outcome"]
    )
    .expect("Failed to create webhook_events metric");

    /// Counter: finished sync flows by flow and result
    pub static ref FLOW_RESULTS: CounterVec = register_counter_vec!(
        "cardhub_flow_results_total",
        "Sync flow results by flow and outcome",
        &["flow", "outcome"]
    )
    .expect("Failed to create flow_results metric");

    /// Counter: failed flows by error kind
    pub static ref FLOW_ERRORS: CounterVec = register_counter_vec!(
        "cardhub_flow_errors_total",
        "Sync flow failures by flow and error kind",
        &["flow", "error_type"]
    )
    .expect("Failed to create flow_errors metric");

    /// Histogram: outbound call duration including retries (seconds)
    pub static ref REMOTE_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "cardhub_remote_call_duration_seconds",
        "Duration of outbound Trello/GitLab calls",
        &["service"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0]
    )
    .expect("Failed to create remote_call_duration metric");
}

/// Record what happened to an inbound webhook
pub fn record_webhook(source: &str, outcome: &str) {
    WEBHOOK_EVENTS.with_label_values(&[source, outcome]).inc();
}

/// Record a finished flow
pub fn record_flow(flow: &str, outcome: &str) {
    FLOW_RESULTS.with_label_values(&[flow, outcome]).inc();
}

/// Record a failed flow
pub fn record_flow_error(flow: &str, error_type: &str) {
    FLOW_ERRORS.with_label_values(&[flow, error_type]).inc();
}

/// Record an outbound call duration
pub fn record_remote_call(service: &str, duration_secs: f64) {
    REMOTE_CALL_DURATION
        .with_label_values(&[service])
        .observe(duration_secs);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::HubError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::HubError::Other(format!("Metrics are not UTF-8: {}", e)))
}
