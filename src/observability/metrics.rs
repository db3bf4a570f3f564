//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_requests_total` (counter): gated requests by operation, status
//! - `gatekeeper_request_duration_seconds` (histogram): latency by operation
//! - `gatekeeper_rejections_total` (counter): refusals by reason
//! - `gatekeeper_path_escapes_total` (counter): sandbox escape attempts
//! - `gatekeeper_tracked_clients` (gauge): limiter registry size after a sweep
//!
//! Without an installed recorder every call here is a no-op, which keeps tests
//! and the CLI free of exporter setup.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(operation: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "gatekeeper_requests_total",
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gatekeeper_request_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("gatekeeper_rejections_total", "reason" => reason).increment(1);
}

pub fn record_path_escape() {
    metrics::counter!("gatekeeper_path_escapes_total").increment(1);
}

pub fn record_tracked_clients(count: usize) {
    metrics::gauge!("gatekeeper_tracked_clients").set(count as f64);
}
