//! Prometheus metrics for the purchase server.
//!
//! Metrics are recorded through the `metrics` facade everywhere in the
//! runtime. Without an installed recorder the calls are no-ops, so tests and
//! servers without `METRICS_ADDR` pay nothing for them.
//!
//! # Example
//!
//! ```rust,no_run
//! use flashsale_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve /metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Purchase attempts, labelled by `outcome` (`success`, `sold_out`, `error`).
pub const PURCHASE_ATTEMPTS: &str = "flashsale_purchase_attempts_total";
/// Store round-trip time of a purchase attempt.
pub const PURCHASE_DURATION: &str = "flashsale_purchase_duration_seconds";
/// Accepted connections.
pub const CONNECTIONS_TOTAL: &str = "flashsale_connections_total";
/// Currently open connections.
pub const CONNECTIONS_ACTIVE: &str = "flashsale_connections_active";
/// Connections closed by an error, labelled by `kind`.
pub const CONNECTION_ERRORS: &str = "flashsale_connection_errors_total";
/// Purchase events handed to the publisher.
pub const EVENTS_PUBLISHED: &str = "flashsale_events_published_total";
/// Purchase events the publisher rejected.
pub const EVENT_PUBLISH_ERRORS: &str = "flashsale_event_publish_errors_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built or its
    /// listener cannot bind.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a warning,
    /// serves nothing and returns `Ok`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_5, 0.001, 0.002_5, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            // `ExporterError` implements neither `Debug` nor `Display`
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(PURCHASE_ATTEMPTS, "Purchase attempts by outcome");
    describe_histogram!(
        PURCHASE_DURATION,
        "Time spent waiting on the inventory store per attempt"
    );

    describe_counter!(CONNECTIONS_TOTAL, "Total number of accepted connections");
    describe_gauge!(CONNECTIONS_ACTIVE, "Number of currently open connections");
    describe_counter!(
        CONNECTION_ERRORS,
        "Connections closed because of a protocol, timeout or write error"
    );

    describe_counter!(EVENTS_PUBLISHED, "Purchase events handed to the publisher");
    describe_counter!(
        EVENT_PUBLISH_ERRORS,
        "Purchase events the publisher failed to deliver"
    );
}

/// Connection lifecycle metrics recorder.
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Record an accepted connection.
    pub fn record_open() {
        counter!(CONNECTIONS_TOTAL).increment(1);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);
    }

    /// Record a closed connection.
    pub fn record_close() {
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    }

    /// Record a connection closed by an error of the given kind.
    pub fn record_error(kind: &'static str) {
        counter!(CONNECTION_ERRORS, "kind" => kind).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        ConnectionMetrics::record_open();
        ConnectionMetrics::record_error("idle_timeout");
        ConnectionMetrics::record_close();

        // Another test binary may own the global recorder; recording is still safe
        if let Some(rendered) = server.render() {
            assert!(rendered.contains(CONNECTIONS_TOTAL));
            assert!(rendered.contains(CONNECTION_ERRORS));
        }
    }
}
