//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mock_requests_total` (counter): requests by route, method, status
//! - `mock_request_duration_seconds` (histogram): pipeline latency
//! - `mock_fetch_total` (counter): fetch attempts by route and outcome
//! - `mock_routes` (gauge): number of live routes
//!
//! # Design Decisions
//! - Labels use the route pattern, never the raw path, to bound cardinality
//! - Without an installed recorder the macros are no-ops

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

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let labels = [
        ("route", route.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("mock_requests_total", &labels).increment(1);
    histogram!("mock_request_duration_seconds", &labels[..2]).record(start.elapsed().as_secs_f64());
}

pub fn record_fetch(route: &str, outcome: &'static str) {
    counter!("mock_fetch_total", "route" => route.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_route_count(count: usize) {
    gauge!("mock_routes").set(count as f64);
}
