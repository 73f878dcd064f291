//! Test helpers for running the full application instance.

use crate::helpers::recording_bus::RecordingBus;
use anyhow::Result;
use serde_json::Value;
use slack_health::{
    app::AppBuilder,
    config::Config,
    core::{BusMessage, ConfigAction, ConfigEvent, MessageBus},
    internal_metrics::Metrics,
    notification::test_utils::{FakeChatClient, FakeChatClientFactory},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::timeout,
};

/// Represents a running instance of the application for testing purposes.
pub struct TestApp {
    pub bus: Arc<RecordingBus>,
    pub client: FakeChatClient,
    pub factory: FakeChatClientFactory,
    config_tx: mpsc::Sender<ConfigEvent>,
    shutdown_tx: watch::Sender<bool>,
    app_handle: Option<JoinHandle<Result<()>>>,
    ingest_addr: Option<SocketAddr>,
}

impl TestApp {
    /// Pushes a `config` resource change as the configuration store would.
    pub async fn push_config(&self, action: ConfigAction, contents: Value) -> Result<()> {
        self.config_tx
            .send(ConfigEvent::new("config", action, contents))
            .await?;
        Ok(())
    }

    pub async fn publish(&self, message: BusMessage) -> Result<()> {
        self.bus.publish(message).await?;
        Ok(())
    }

    /// Waits until the bus has seen at least `count` subscribe calls.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        let bus = self.bus.clone();
        let reached = crate::helpers::wait_until(Duration::from_secs(2), || {
            bus.calls().iter().filter(|c| *c == "subscribe").count() >= count
        })
        .await;
        assert!(reached, "Timed out waiting for {} subscriptions", count);
    }

    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest_addr
            .expect("Ingest must be enabled to get the address")
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .expect("Failed to send shutdown signal");

        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    client: FakeChatClient,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.ingest.enabled = false;
        config.ingest.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));
        config.metrics.enabled = false;

        Self {
            config,
            client: FakeChatClient::new(),
        }
    }

    pub fn with_config_modifier(mut self, modifier: impl FnOnce(&mut Config)) -> Self {
        modifier(&mut self.config);
        self
    }

    pub fn with_ingest(mut self) -> Self {
        self.config.ingest.enabled = true;
        self
    }

    pub fn with_chat_client(mut self, client: FakeChatClient) -> Self {
        self.client = client;
        self
    }

    /// Builds the application and spawns it.
    pub async fn build(self) -> Result<TestApp> {
        let bus = RecordingBus::new();
        let factory = FakeChatClientFactory::new(self.client.clone());
        let (config_tx, config_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = AppBuilder::new(self.config)
            .bus_override(bus.clone())
            .chat_client_factory_override(Arc::new(factory.clone()))
            .config_events_override(config_rx)
            .metrics_override(Metrics::new())
            .build(shutdown_rx)
            .await?;
        let ingest_addr = app.ingest_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            bus,
            client: self.client,
            factory,
            config_tx,
            shutdown_tx,
            app_handle: Some(app_handle),
            ingest_addr,
        })
    }
}
