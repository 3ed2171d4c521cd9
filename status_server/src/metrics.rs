//! Prometheus metrics for build-status observability.

use std::net::SocketAddr;

use metrics::{counter, gauge};

/// Install the Prometheus exporter, serving scrapes on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!("Prometheus metrics on {}", addr),
        Err(e) => tracing::warn!("Failed to install Prometheus exporter: {}", e),
    }
}

/// Record an inbound message on a transport.
pub fn event_received(transport: &'static str) {
    counter!("build_status_events_received_total", "transport" => transport).increment(1);
}

/// Record a message that did not update the store.
pub fn event_ignored(reason: &'static str) {
    counter!("build_status_events_ignored_total", "reason" => reason).increment(1);
}

/// Record a store update.
pub fn store_updated(status: &'static str) {
    counter!("build_status_store_updates_total", "status" => status).increment(1);
}

/// Record a failed store update.
pub fn store_error() {
    counter!("build_status_store_errors_total").increment(1);
}

/// Set the latest aggregate status.
pub fn aggregate_computed(passing: bool) {
    gauge!("build_status_passing").set(if passing { 1.0 } else { 0.0 });
}

/// Record how a notification ended.
pub fn notification_finished(outcome: &'static str) {
    counter!("build_status_notifications_total", "outcome" => outcome).increment(1);
}
