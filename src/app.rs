//! The main application logic, decoupled from the entry point.

use crate::{
    bus::LocalBus,
    config::Config,
    config_store::FileConfigStore,
    core::{ChatClientFactory, ConfigEvent, MessageBus},
    ingest::IngestServer,
    internal_metrics::{Metrics, MetricsBuilder},
    notification::slack::SlackClientFactory,
    runtime_config::ConfigMaterializer,
    subscription::SubscriptionController,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    bus: Arc<dyn MessageBus>,
    ingest_addr: Option<SocketAddr>,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The bus alerts are published on.
    pub fn bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    pub fn ingest_addr(&self) -> Option<SocketAddr> {
        self.ingest_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Components can be overridden for testing.
pub struct AppBuilder {
    config: Config,
    bus_override: Option<Arc<dyn MessageBus>>,
    chat_client_factory_override: Option<Arc<dyn ChatClientFactory>>,
    config_events_override: Option<mpsc::Receiver<ConfigEvent>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            bus_override: None,
            chat_client_factory_override: None,
            config_events_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the message bus.
    pub fn bus_override(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus_override = Some(bus);
        self
    }

    /// Overrides the factory that builds Slack clients.
    pub fn chat_client_factory_override(mut self, factory: Arc<dyn ChatClientFactory>) -> Self {
        self.chat_client_factory_override = Some(factory);
        self
    }

    /// Feeds configuration events from `rx` instead of the file store.
    pub fn config_events_override(mut self, rx: mpsc::Receiver<ConfigEvent>) -> Self {
        self.config_events_override = Some(rx);
        self
    }

    /// Overrides the metrics system.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and starts all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx.clone());

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone())
                    .build(shutdown_rx.clone())
                    .await
            }
        };
        let metrics_addr = if let Some((server, addr)) = metrics_server_info {
            info!(%addr, "Serving metrics");
            task_manager.spawn("MetricsServer", server.run());
            Some(addr)
        } else {
            None
        };

        // =========================================================================
        // 2. Bus and chat clients
        // =========================================================================
        let bus: Arc<dyn MessageBus> = self
            .bus_override
            .unwrap_or_else(|| Arc::new(LocalBus::new()));
        let clients: Arc<dyn ChatClientFactory> = self
            .chat_client_factory_override
            .unwrap_or_else(|| Arc::new(SlackClientFactory::new(config.slack.clone())));

        // =========================================================================
        // 3. Configuration events
        // =========================================================================
        let config_events_rx = match self.config_events_override {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::channel(16);
                match &config.config_store.path {
                    Some(path) => {
                        FileConfigStore::new(path, config.agent.config_name.clone())?
                            .spawn(tx, &task_manager)
                            .context("Failed to start configuration store")?;
                    }
                    None => {
                        info!("No configuration store configured, using [agent] defaults only");
                    }
                }
                rx
            }
        };

        // =========================================================================
        // 4. Subscription controller
        // =========================================================================
        let controller = SubscriptionController::new(
            bus.clone(),
            clients,
            ConfigMaterializer::new(config.agent.runtime_defaults()),
            metrics,
        )
        .config_name(config.agent.config_name.clone())
        .topic_prefix(config.agent.topic_prefix.clone());
        task_manager.spawn(
            "SubscriptionController",
            controller.run(config_events_rx, task_manager.get_shutdown_rx()),
        );

        // =========================================================================
        // 5. Ingest endpoint
        // =========================================================================
        let ingest_addr = if config.ingest.enabled {
            let listener = TcpListener::bind(config.ingest.listen_address)
                .await
                .with_context(|| {
                    format!(
                        "Failed to bind ingest server to {}",
                        config.ingest.listen_address
                    )
                })?;
            let addr = listener.local_addr()?;
            info!(%addr, "Accepting alerts over HTTP");
            let server = IngestServer::new(listener, bus.clone(), task_manager.get_shutdown_rx());
            task_manager.spawn("IngestServer", server.run());
            Some(addr)
        } else {
            None
        };

        info!(identity = %config.agent.identity, "Application components started");

        Ok(App {
            task_manager,
            bus,
            ingest_addr,
            metrics_addr,
        })
    }
}
