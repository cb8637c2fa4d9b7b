//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests dispatched, by tenant
//! - `relay_responses_total` (counter): responses dispatched, by path (shortcut | transport)
//! - `relay_acknowledgements_total` (counter): acknowledges processed, by outcome
//! - `relay_connectors` (gauge): connector connections on this instance
//! - `relay_outsourced_bodies_total` (counter): bodies moved to the body store, by kind
//! - `relay_request_duration_seconds` (histogram): HTTP relay latency, by status

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder globally.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Serve `/metrics` on its own listener.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Serving metrics");
    axum::serve(listener, app.into_make_service()).await
}

pub fn record_request_dispatched(tenant: &str) {
    metrics::counter!("relay_requests_total", "tenant" => tenant.to_string()).increment(1);
}

pub fn record_response_dispatched(path: &'static str) {
    metrics::counter!("relay_responses_total", "path" => path).increment(1);
}

pub fn record_acknowledgement(outcome: &'static str) {
    metrics::counter!("relay_acknowledgements_total", "outcome" => outcome).increment(1);
}

pub fn record_connectors(count: usize) {
    metrics::gauge!("relay_connectors").set(count as f64);
}

pub fn record_outsourced_body(kind: &'static str) {
    metrics::counter!("relay_outsourced_bodies_total", "kind" => kind).increment(1);
}

pub fn record_relay_duration(status: u16, started: Instant) {
    metrics::histogram!("relay_request_duration_seconds", "status" => status.to_string())
        .record(started.elapsed().as_secs_f64());
}
