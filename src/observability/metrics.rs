//! Metrics collection and exposition.
//!
//! # Metrics
//! - `queue_proxy_dispatch_total` (counter): dispatches by outcome
//! - `queue_proxy_dispatch_duration_seconds` (histogram): push-to-answer latency
//! - `queue_proxy_workers_spawned_total` (counter): one-shot workers started
//! - `queue_proxy_live_workers` (gauge): workers currently alive
//! - `queue_proxy_buffer_depth` (gauge): requests claimed but not yet taken
//! - `queue_proxy_fetch_total` (counter): outbound fetches by result
//! - `queue_proxy_responses_reclaimed_total` (counter): abandoned responses deleted
//!
//! Recording is a no-op until a recorder is installed by `init_metrics`.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(outcome: &'static str, start: Instant) {
    metrics::counter!("queue_proxy_dispatch_total", "outcome" => outcome).increment(1);
    metrics::histogram!("queue_proxy_dispatch_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

pub fn record_worker_spawned() {
    metrics::counter!("queue_proxy_workers_spawned_total").increment(1);
}

pub fn record_live_workers(count: usize) {
    metrics::gauge!("queue_proxy_live_workers").set(count as f64);
}

pub fn record_buffer_depth(depth: usize) {
    metrics::gauge!("queue_proxy_buffer_depth").set(depth as f64);
}

pub fn record_fetch(result: &'static str) {
    metrics::counter!("queue_proxy_fetch_total", "result" => result).increment(1);
}

pub fn record_reclaimed(count: usize) {
    metrics::counter!("queue_proxy_responses_reclaimed_total").increment(count as u64);
}
