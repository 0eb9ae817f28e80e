//! Prometheus metrics for the queue store.
//!
//! The store records through the `metrics` facade unconditionally. Nothing is
//! exported until a [`MetricsServer`] installs the Prometheus recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use request_queue_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server that binds `addr` once started
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Server for the configured address, or `None` when metrics are disabled
    #[must_use]
    pub const fn from_config(config: &StoreConfig) -> Option<Self> {
        if config.metrics_enabled {
            Some(Self::new(config.metrics_addr))
        } else {
            None
        }
    }

    /// Address the exporter listens on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe the queue metrics, install the Prometheus recorder and serve
    /// `/metrics` on [`addr`](Self::addr).
    ///
    /// Must be called inside a Tokio runtime; the listener runs as a spawned
    /// task. A recorder that is already installed is tolerated, so tests can
    /// create several servers in one process. In that case nothing is served.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the exporter cannot be
    /// built.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
            )
            .and_then(PrometheusBuilder::build)
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                let addr = self.addr;
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!(%addr, "Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Serving Prometheus metrics");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
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
    describe_counter!(
        "queue_mutations_total",
        "Queue mutations committed, by action"
    );
    describe_counter!(
        "queue_mutation_rejections_total",
        "Queue mutations rejected, by action and error kind"
    );
    describe_histogram!(
        "queue_mutation_duration_seconds",
        "Time from lock acquisition to commit or rejection"
    );
    describe_counter!(
        "queue_side_effects_total",
        "Side effects started after commit, by kind"
    );
    describe_counter!(
        "queue_side_effects_failed_total",
        "Side effects that failed after commit, by kind"
    );
    describe_gauge!(
        "queue_open_requests",
        "Open requests across all items after the last commit"
    );
}

/// Mutation metrics recorder.
pub struct MutationMetrics;

impl MutationMetrics {
    /// Record a committed mutation.
    pub fn record_commit(action: &'static str, duration: Duration) {
        counter!("queue_mutations_total", "action" => action).increment(1);
        histogram!("queue_mutation_duration_seconds", "action" => action)
            .record(duration.as_secs_f64());
    }

    /// Record a rejected mutation.
    pub fn record_rejection(action: &'static str, kind: &'static str) {
        counter!("queue_mutation_rejections_total", "action" => action, "kind" => kind)
            .increment(1);
    }

    /// Record the number of open requests held by the store.
    #[allow(clippy::cast_precision_loss)] // Request counts stay far below 2^52
    pub fn record_open_requests(count: usize) {
        gauge!("queue_open_requests").set(count as f64);
    }
}

/// Side effect metrics recorder.
pub struct SideEffectMetrics;

impl SideEffectMetrics {
    /// Record a side effect being started.
    pub fn record_started(kind: &'static str) {
        counter!("queue_side_effects_total", "kind" => kind).increment(1);
    }

    /// Record a failed side effect.
    pub fn record_failure(kind: &'static str) {
        counter!("queue_side_effects_failed_total", "kind" => kind).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_server_follows_config() {
        assert!(MetricsServer::from_config(&StoreConfig::default()).is_none());

        let addr = "127.0.0.1:9191".parse().unwrap();
        let server = MetricsServer::from_config(&StoreConfig::default().with_metrics_addr(addr));
        assert_eq!(server.map(|s| s.addr()), Some(addr));
    }

    #[tokio::test]
    async fn test_start_binds_configured_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut server = MetricsServer::new(taken.local_addr().unwrap());

        let err = server.start().unwrap_err();

        assert!(matches!(err, MetricsError::Build(_)));
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_queue_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        MutationMetrics::record_commit("create_request", Duration::from_millis(3));
        MutationMetrics::record_rejection("check_out", "validation");
        SideEffectMetrics::record_started("send_notice");
        SideEffectMetrics::record_failure("send_notice");

        // Another test may have installed the recorder first
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("queue_mutations_total"));
            assert!(rendered.contains("queue_mutation_rejections_total"));
            assert!(rendered.contains("queue_side_effects_failed_total"));
        }
    }
}
