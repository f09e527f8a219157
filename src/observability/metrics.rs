//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by outcome
//! - `guard_rejections_total` (counter): rejections by code
//! - `guard_risk_level_total` (counter): classification distribution
//! - `guard_store_degraded_total` (counter): fail-open occurrences
//! - `guard_sweep_evicted_total` (counter): records evicted by sweeps
//! - `guard_store_latency_seconds` (histogram): window store admit latency

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "failed to install metrics exporter"),
    }
}

pub fn record_allowed(policy: &str) {
    counter!("guard_requests_total", "outcome" => "allowed", "policy" => policy.to_string())
        .increment(1);
}

pub fn record_rejection(code: &'static str) {
    counter!("guard_rejections_total", "code" => code).increment(1);
}

pub fn record_risk_level(level: &'static str) {
    counter!("guard_risk_level_total", "level" => level).increment(1);
}

pub fn record_store_degraded() {
    counter!("guard_store_degraded_total").increment(1);
}

pub fn record_sweep(evicted: usize) {
    counter!("guard_sweep_evicted_total").increment(evicted as u64);
}

pub fn record_store_latency(seconds: f64) {
    histogram!("guard_store_latency_seconds").record(seconds);
}
