//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define hub metrics (connections, handshakes, dispatch, sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `hub_connections_total` (counter): accepted connections by route
//! - `hub_classification_timeouts_total` (counter): silent connections
//!   defaulted after the grace period
//! - `hub_handshakes_total` (counter): report correlations by outcome
//! - `hub_dispatch_total` (counter): WebDAV requests by response status
//! - `hub_webdav_sessions` (gauge): currently open WebDAV sessions
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - The exporter is opt-in through configuration

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_connection(route: &'static str) {
    ::metrics::counter!("hub_connections_total", "route" => route).increment(1);
}

pub fn record_classification_timeout() {
    ::metrics::counter!("hub_classification_timeouts_total").increment(1);
}

pub fn record_handshake(outcome: &'static str) {
    ::metrics::counter!("hub_handshakes_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(status: u16) {
    ::metrics::counter!("hub_dispatch_total", "status" => status.to_string()).increment(1);
}

pub fn record_webdav_sessions(count: usize) {
    ::metrics::gauge!("hub_webdav_sessions").set(count as f64);
}
