//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, origin
//!   (configured origin name in reverse mode, `forward` or `tunnel` otherwise)
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_active_connections` (gauge): live client connections and tunnels
//! - `proxy_tunnels_total` (counter): CONNECT attempts by outcome
//! - `proxy_tunnel_bytes_total` (counter): tunneled bytes by direction
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished forwarded request.
pub fn record_request(method: &str, status: u16, origin: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "origin" => origin.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn set_active_connections(count: u64) {
    gauge!("proxy_active_connections").set(count as f64);
}

/// `outcome` is one of `established`, `dial_failed`, `upgrade_failed`.
pub fn record_tunnel(outcome: &'static str) {
    counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
}

pub fn record_tunnel_bytes(client_to_origin: u64, origin_to_client: u64) {
    counter!("proxy_tunnel_bytes_total", "direction" => "client_to_origin").increment(client_to_origin);
    counter!("proxy_tunnel_bytes_total", "direction" => "origin_to_client").increment(origin_to_client);
}
