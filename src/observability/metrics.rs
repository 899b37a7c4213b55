//! Metrics collection and exposition.
//!
//! # Metrics
//! - `interlace_pipeline_executions_total` (counter): by pipeline, outcome
//! - `interlace_calls_total` (counter): server calls by method, status
//! - `interlace_call_duration_seconds` (histogram): server call latency
//! - `interlace_client_requests_total` (counter): client calls by method, status
//! - `interlace_dependency_resolutions_total` (counter): by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing unless they opt in
//! - Labels are low-cardinality only; paths and keys are never labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_pipeline_execution(pipeline: &str, outcome: &'static str) {
    counter!(
        "interlace_pipeline_executions_total",
        "pipeline" => pipeline.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_call(method: &str, status: u16, start: Instant) {
    counter!(
        "interlace_calls_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("interlace_call_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_client_request(method: &str, status: Option<u16>) {
    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "error".to_string());
    counter!(
        "interlace_client_requests_total",
        "method" => method.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_dependency_resolution(outcome: &'static str) {
    counter!("interlace_dependency_resolutions_total", "outcome" => outcome).increment(1);
}
