//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxycfg_tracked_proxies` (gauge): proxies with a live watch state
//! - `proxycfg_watchers` (gauge): registered watchers across all proxies
//! - `proxycfg_snapshots_delivered_total` (counter): successful deliveries
//! - `proxycfg_snapshots_skipped_total` (counter): deliveries abandoned
//! - `proxycfg_proxy_errors_total` (counter): failed watch state builds
//! - `proxycfg_reconcile_passes_total` (counter): run loop passes

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tracked_proxies(count: usize) {
    metrics::gauge!("proxycfg_tracked_proxies").set(count as f64);
}

pub fn record_watchers(count: usize) {
    metrics::gauge!("proxycfg_watchers").set(count as f64);
}

pub fn record_delivery(delivered: usize, skipped: usize) {
    if delivered > 0 {
        metrics::counter!("proxycfg_snapshots_delivered_total").increment(delivered as u64);
    }
    if skipped > 0 {
        metrics::counter!("proxycfg_snapshots_skipped_total").increment(skipped as u64);
    }
}

pub fn record_proxy_error() {
    metrics::counter!("proxycfg_proxy_errors_total").increment(1);
}

pub fn record_reconcile_pass() {
    metrics::counter!("proxycfg_reconcile_passes_total").increment(1);
}
