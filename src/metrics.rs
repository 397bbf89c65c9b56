//! Prometheus metrics for betting sessions and platform requests.
//!
//! This module provides metrics for:
//! - HTTP request latency and retries
//! - Bets placed, rejected and skipped rounds
//! - Session terminations by reason

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};

use crate::error::{BotError, Result};

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Request retries counter metric name.
pub const METRIC_REQUEST_RETRIES: &str = "request_retries_total";
/// Authentication failures counter metric name.
pub const METRIC_AUTH_FAILURES: &str = "auth_failures_total";
/// Bets placed counter metric name.
pub const METRIC_BETS_PLACED: &str = "bets_placed_total";
/// Bets rejected counter metric name.
pub const METRIC_BETS_REJECTED: &str = "bets_rejected_total";
/// Skipped rounds counter metric name.
pub const METRIC_ROUNDS_SKIPPED: &str = "rounds_skipped_total";
/// Verified outcomes counter metric name.
pub const METRIC_OUTCOMES_VERIFIED: &str = "outcomes_verified_total";
/// Finished sessions counter metric name.
pub const METRIC_SESSIONS_FINISHED: &str = "sessions_finished_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );

    describe_counter!(
        METRIC_REQUEST_RETRIES,
        "Total number of retried platform requests"
    );
    describe_counter!(
        METRIC_AUTH_FAILURES,
        "Total number of requests rejected for bad credentials"
    );
    describe_counter!(METRIC_BETS_PLACED, "Total number of accepted bets");
    describe_counter!(
        METRIC_BETS_REJECTED,
        "Total number of bets rejected by the platform"
    );
    describe_counter!(
        METRIC_ROUNDS_SKIPPED,
        "Total number of rounds skipped before a bet was accepted"
    );
    describe_counter!(
        METRIC_OUTCOMES_VERIFIED,
        "Total number of round results checked after a bet"
    );
    describe_counter!(
        METRIC_SESSIONS_FINISHED,
        "Total number of sessions that reached the stopped state"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus exporter on `0.0.0.0:port`.
pub fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| BotError::Metrics(e.to_string()))?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment request retries counter.
pub fn inc_request_retries(endpoint: &str) {
    counter!(METRIC_REQUEST_RETRIES, "endpoint" => endpoint.to_string()).increment(1);
}

/// Increment authentication failures counter.
pub fn inc_auth_failures() {
    counter!(METRIC_AUTH_FAILURES).increment(1);
}

/// Increment bets placed counter.
pub fn inc_bets_placed() {
    counter!(METRIC_BETS_PLACED).increment(1);
}

/// Increment bets rejected counter.
pub fn inc_bets_rejected(reason: &str) {
    counter!(METRIC_BETS_REJECTED, "reason" => reason.to_string()).increment(1);
}

/// Increment skipped rounds counter.
pub fn inc_rounds_skipped() {
    counter!(METRIC_ROUNDS_SKIPPED).increment(1);
}

/// Increment verified outcomes counter.
pub fn inc_outcomes_verified() {
    counter!(METRIC_OUTCOMES_VERIFIED).increment(1);
}

/// Increment finished sessions counter.
pub fn inc_sessions_finished(reason: &'static str) {
    counter!(METRIC_SESSIONS_FINISHED, "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        init_metrics();
        record_http_latency(Instant::now(), "balance");
        inc_request_retries("balance");
        inc_bets_placed();
        inc_bets_rejected("bet.closed");
        inc_sessions_finished("quota_reached");
    }

    #[tokio::test]
    async fn exporter_on_busy_port_is_a_metrics_error() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = install_exporter(port).unwrap_err();
        assert!(matches!(err, BotError::Metrics(_)));
    }
}
