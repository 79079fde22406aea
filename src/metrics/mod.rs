//! # Metrics
//!
//! Prometheus counters and histograms for the request pipeline, exposed at
//! `GET /metrics`.
//!
//! **Counters:**
//! - `tokencap_requests_total{provider, status}`
//! - `tokencap_budget_rejections_total{project_id}`
//! - `tokencap_ledger_errors_total`
//!
//! **Histograms:**
//! - `tokencap_request_duration_seconds{provider}`
//! - `tokencap_estimated_cost_usd{provider}`
//! - `tokencap_input_tokens{provider}`

pub mod handler;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder with buckets tuned for LLM request
/// latency (seconds) and per-request cost (USD, small values).
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let duration_buckets = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];
    let cost_buckets = &[0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("tokencap_request_duration_seconds".to_string()),
            duration_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full("tokencap_estimated_cost_usd".to_string()),
            cost_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}

pub fn record_request(provider: &str, status: &str, duration_seconds: f64) {
    metrics::counter!("tokencap_requests_total", "provider" => provider.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!("tokencap_request_duration_seconds", "provider" => provider.to_string())
        .record(duration_seconds);
}

pub fn record_budget_rejection(project_id: &str) {
    metrics::counter!("tokencap_budget_rejections_total", "project_id" => project_id.to_string())
        .increment(1);
}

pub fn record_estimate(provider: &str, input_tokens: u64, estimated_cost_usd: f64) {
    metrics::histogram!("tokencap_input_tokens", "provider" => provider.to_string())
        .record(input_tokens as f64);
    metrics::histogram!("tokencap_estimated_cost_usd", "provider" => provider.to_string())
        .record(estimated_cost_usd);
}

pub fn record_ledger_error() {
    metrics::counter!("tokencap_ledger_errors_total").increment(1);
}
