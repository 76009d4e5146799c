//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilience_retries_total` (counter): retries scheduled, by policy
//! - `resilience_circuit_transitions_total` (counter): breaker transitions, by policy, state
//! - `resilience_rejections_total` (counter): calls refused without running, by policy, kind
//! - `resilience_timeouts_total` (counter): deadlines hit, by policy
//! - `resilience_fallbacks_total` (counter): substituted outcomes, by policy
//! - `resilience_cache_requests_total` (counter): cache traffic, by policy, result
//! - `resilience_bulkhead_in_flight` (gauge): executing calls, by policy
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_retry(policy: &str) {
    counter!("resilience_retries_total", "policy" => policy.to_owned()).increment(1);
}

pub fn record_circuit_transition(policy: &str, state: &'static str) {
    counter!(
        "resilience_circuit_transitions_total",
        "policy" => policy.to_owned(),
        "state" => state
    )
    .increment(1);
}

pub fn record_rejection(policy: &str, kind: &'static str) {
    counter!(
        "resilience_rejections_total",
        "policy" => policy.to_owned(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_timeout(policy: &str) {
    counter!("resilience_timeouts_total", "policy" => policy.to_owned()).increment(1);
}

pub fn record_fallback(policy: &str) {
    counter!("resilience_fallbacks_total", "policy" => policy.to_owned()).increment(1);
}

pub fn record_cache(policy: &str, result: &'static str) {
    counter!(
        "resilience_cache_requests_total",
        "policy" => policy.to_owned(),
        "result" => result
    )
    .increment(1);
}

pub fn record_bulkhead_in_flight(policy: &str, in_flight: usize) {
    gauge!("resilience_bulkhead_in_flight", "policy" => policy.to_owned()).set(in_flight as f64);
}
