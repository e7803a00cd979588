//! Prometheus metrics for the identity server.
//!
//! Counters are recorded through the `metrics` facade and only exported when
//! [`init_metrics`] has installed the Prometheus recorder; otherwise they are
//! no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use mi_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::verification_requests_total("email");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// A verification code was sent on `channel`.
pub fn verification_requests_total(channel: &str) {
    metrics::counter!("verification_requests_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// A code check finished with `outcome` (`approved` or an error kind).
pub fn verification_checks_total(channel: &str, outcome: &str) {
    metrics::counter!("verification_checks_total",
        "channel" => channel.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// An access token was minted by `flow` (register, login, federated, reset, refresh).
pub fn auth_tokens_issued_total(flow: &str) {
    metrics::counter!("auth_tokens_issued_total",
        "flow" => flow.to_string()
    )
    .increment(1);
}

/// A code request was refused by the throttle.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
