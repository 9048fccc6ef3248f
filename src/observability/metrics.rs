//! Metrics collection and exposition.
//!
//! # Metrics
//! - `token_relay_requests_total` (counter): requests by method, status
//! - `token_relay_request_duration_seconds` (histogram): end-to-end latency to response head
//! - `token_relay_upstream_errors_total` (counter): forwarding failures by kind
//! - `token_relay_token_rotations_total` (counter): rotations by outcome
//! - `token_relay_active_connections` (gauge): open inbound connections
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "token_relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("token_relay_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    ::metrics::counter!("token_relay_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_rotation(outcome: &'static str) {
    ::metrics::counter!("token_relay_token_rotations_total", "outcome" => outcome).increment(1);
}

pub fn connection_opened() {
    ::metrics::gauge!("token_relay_active_connections").increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!("token_relay_active_connections").decrement(1.0);
}
