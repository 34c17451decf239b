//! Prometheus metrics for the gateway.
//!
//! Exposed on a dedicated listener (`METRICS_PORT`, default 9090). Recording
//! functions are no-ops until [`init_metrics`] installs the exporter, so tests
//! and metrics-disabled deployments can call them freely.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gateway_auth_denied_total` - Rejected credentials (label: reason)
//! - `gateway_rate_limited_total` - Rate-limit rejections (label: tier)
//! - `gateway_validation_failures_total` - Rejected inputs (label: reason)
//! - `gateway_upstream_failures_total` - Failed generations (label: category)
//! - `gateway_generations_total` - Successful generations
//!
//! ## Histograms
//! - `gateway_request_duration_seconds` - Request duration (labels: method, status)
//! - `gateway_upstream_duration_seconds` - Upstream call duration
//!
//! ## Gauges
//! - `gateway_rate_limit_active_clients` - Tracked clients (label: tier)

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::rate_limiter::RateLimitTier;
use crate::upstream::UpstreamErrorCategory;

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_DENIED_TOTAL: &str = "gateway_auth_denied_total";
    pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
    pub const VALIDATION_FAILURES_TOTAL: &str = "gateway_validation_failures_total";
    pub const UPSTREAM_FAILURES_TOTAL: &str = "gateway_upstream_failures_total";
    pub const GENERATIONS_TOTAL: &str = "gateway_generations_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const UPSTREAM_DURATION_SECONDS: &str = "gateway_upstream_duration_seconds";
    pub const RATE_LIMIT_ACTIVE_CLIENTS: &str = "gateway_rate_limit_active_clients";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use or
/// a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::AUTH_DENIED_TOTAL,
        "Requests rejected for a missing or invalid API key"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by a rate-limit tier"
    );
    describe_counter!(
        names::VALIDATION_FAILURES_TOTAL,
        "Requests rejected by input validation"
    );
    describe_counter!(
        names::UPSTREAM_FAILURES_TOTAL,
        "Generation calls that failed upstream"
    );
    describe_counter!(names::GENERATIONS_TOTAL, "Successful generations");

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream generation call duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_ACTIVE_CLIENTS,
        "Clients currently tracked by a rate-limit tier"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_validation_failure(reason: &'static str) {
    counter!(names::VALIDATION_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_upstream_failure(category: UpstreamErrorCategory) {
    counter!(names::UPSTREAM_FAILURES_TOTAL, "category" => category.as_str()).increment(1);
}

pub fn record_generation() {
    counter!(names::GENERATIONS_TOTAL).increment(1);
}

pub fn record_request_duration(method: &str, status: &str, duration_secs: f64) {
    histogram!(
        names::REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// Update the tracked-clients gauge for a tier.
pub fn set_active_clients(tier: RateLimitTier, clients: usize) {
    // Precision loss only above 2^53 clients.
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::RATE_LIMIT_ACTIVE_CLIENTS, "tier" => tier.as_str()).set(clients as f64);
}
