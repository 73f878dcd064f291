//! # Internal Metrics Module
//!
//! Infrastructure for collecting and exposing application metrics.
//!
//! - **`MetricsBuilder`** installs the Prometheus recorder and prepares the
//!   `MetricsServer`.
//! - **`Metrics`** is a cheap, cloneable handle the rest of the application
//!   uses to record subscription lifecycle events. Per-alert counters are
//!   recorded with the `metrics` macros at the call site.
//! - **`MetricsServer`** (in `server.rs`) serves `/metrics` with `axum`.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub reconfigurations_total: Counter,
    pub config_incomplete_total: Counter,
    pub subscription_active: Gauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("alerts_received_total", Unit::Count, "Total number of alert messages received from the bus.");
        metrics::describe_counter!("alerts_unparsed_topic_total", Unit::Count, "Alerts whose topic did not follow alerts/<class>/<identity>.");
        metrics::describe_counter!("render_failures_total", Unit::Count, "Alerts dropped because the message template could not be rendered.");
        metrics::describe_counter!("notifications_sent_total", Unit::Count, "Messages accepted by the chat service, one per channel.");
        metrics::describe_counter!("notifications_failed_total", Unit::Count, "Messages the chat service did not accept, one per channel.");
        metrics::describe_counter!("reconfigurations_total", Unit::Count, "Complete configurations applied, each followed by a resubscription.");
        metrics::describe_counter!("config_incomplete_total", Unit::Count, "Configuration changes ignored because a required field was empty.");
        metrics::describe_gauge!("subscription_active", Unit::Count, "1 while an alert subscription is active, 0 otherwise.");

        Self {
            reconfigurations_total: metrics::counter!("reconfigurations_total"),
            config_incomplete_total: metrics::counter!("config_incomplete_total"),
            subscription_active: metrics::gauge!("subscription_active"),
        }
    }

    pub fn record_reconfiguration(&self) {
        self.reconfigurations_total.increment(1);
        self.subscription_active.set(1.0);
    }

    pub fn record_incomplete_config(&self) {
        self.config_incomplete_total.increment(1);
    }

    pub fn record_unsubscribed(&self) {
        self.subscription_active.set(0.0);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and returns the `Metrics` handle
    /// together with a server ready to be spawned.
    ///
    /// If metrics are disabled, or the recorder cannot be set up, the
    /// returned handle records into the no-op default recorder and no
    /// server is returned.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::new(), None);
        }

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        // Bind before installing the recorder so a bind failure leaves the
        // process without a half-configured exporter.
        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::new(), None);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::new(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::new(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}
