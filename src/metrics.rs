//! Gateway metrics
//!
//! Counters and histograms emitted through the `metrics` facade. Without an
//! installed recorder every call is a no-op.
//!
//! # Metrics
//!
//! - `gateway_chat_requests_total`: chat invocations by `mode` (blocking, stream, title, draw)
//! - `gateway_upstream_errors_total`: failed upstream sessions by `kind`
//! - `gateway_upstream_session_duration_seconds`: session duration by `outcome`
//! - `gateway_upstream_active_sessions`: gauge of open upstream sessions
//! - `gateway_draws_generated_total`: draws produced by the model
//! - `gateway_draw_cache_hits_total`: draw requests answered from storage

use crate::error::GatewayError;
use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::cell::Cell;
use std::time::Instant;

/// Records one chat invocation
pub fn record_chat_request(mode: &'static str) {
    increment_counter!("gateway_chat_requests_total", "mode" => mode);
}

/// Records a draw produced by the model
pub fn record_draw_generated() {
    increment_counter!("gateway_draws_generated_total");
}

/// Records a draw served from storage
pub fn record_draw_cache_hit() {
    increment_counter!("gateway_draw_cache_hits_total");
}

/// Short label for an error, used as the `kind` metric label
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    match crate::error::gateway_error(err) {
        Some(GatewayError::AuthUnavailable) => "auth_unavailable",
        Some(GatewayError::Upstream { .. }) => "upstream",
        Some(GatewayError::Transport(_)) => "transport",
        Some(GatewayError::MalformedDrawResponse) => "malformed_draw",
        Some(GatewayError::IncompleteDrawResponse(_)) => "incomplete_draw",
        Some(GatewayError::Storage(_)) => "storage",
        Some(_) => "other",
        None => "unknown",
    }
}

/// Tracks one upstream session from connect to release
///
/// Increments the active-session gauge on creation. Exactly one of
/// [`record_completion`](Self::record_completion),
/// [`record_cancelled`](Self::record_cancelled) or
/// [`record_error`](Self::record_error) takes effect; dropping an unrecorded
/// tracker still decrements the gauge.
#[derive(Debug)]
pub struct UpstreamSessionMetrics {
    start: Instant,
    recorded: Cell<bool>,
}

impl UpstreamSessionMetrics {
    /// Start tracking a session
    pub fn new() -> Self {
        increment_gauge!("gateway_upstream_active_sessions", 1.0);
        Self {
            start: Instant::now(),
            recorded: Cell::new(false),
        }
    }

    /// The session reached its terminal frame
    pub fn record_completion(&self) {
        self.finish("completed");
    }

    /// The consumer went away before the terminal frame
    pub fn record_cancelled(&self) {
        self.finish("cancelled");
    }

    /// The session failed
    pub fn record_error(&self, err: &anyhow::Error) {
        if self.recorded.get() {
            return;
        }
        increment_counter!("gateway_upstream_errors_total", "kind" => error_kind(err));
        self.finish("error");
    }

    fn finish(&self, outcome: &'static str) {
        if self.recorded.get() {
            return;
        }
        self.recorded.set(true);

        histogram!(
            "gateway_upstream_session_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "outcome" => outcome
        );
        decrement_gauge!("gateway_upstream_active_sessions", 1.0);
    }
}

impl Default for UpstreamSessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UpstreamSessionMetrics {
    fn drop(&mut self) {
        if !self.recorded.get() {
            decrement_gauge!("gateway_upstream_active_sessions", 1.0);
        }
    }
}

/// Installs the Prometheus exporter when the `prometheus` feature is enabled
///
/// `bind` is the listen address of the scrape endpoint; `None` keeps the
/// exporter's default. Without the feature this does nothing.
pub fn init_metrics_exporter(bind: Option<&str>) {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let mut builder = PrometheusBuilder::new();
        if let Some(addr) = bind.and_then(|b| b.parse::<std::net::SocketAddr>().ok()) {
            builder = builder.with_http_listener(addr);
        }
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
    #[cfg(not(feature = "prometheus"))]
    {
        if bind.is_some() {
            tracing::warn!("metrics_bind is set but the prometheus feature is disabled");
        }
    }
}
