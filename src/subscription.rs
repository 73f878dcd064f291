//! The subscription controller.
//!
//! The controller owns the agent's single subscription to the alert topic
//! namespace and the one task routing it. Every complete configuration change
//! drops the subscription, lets its router finish, installs a fresh
//! [`Pipeline`] snapshot and subscribes again; an incomplete configuration
//! leaves everything as it was.
//!
//! ```text
//!   Unconfigured --complete--> Active --complete--> Active
//!        |                       |
//!    incomplete              incomplete
//!        v                       v
//!   Unconfigured              Active (unchanged)
//! ```

use crate::bus::BusError;
use crate::core::{ChatClientFactory, ConfigAction, ConfigEvent, MessageBus, Subscription};
use crate::internal_metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::runtime_config::{ConfigMaterializer, Materialized};
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No complete configuration has been applied yet.
    Unconfigured,
    /// A subscription is routing alerts through the current pipeline.
    Active,
}

/// Owns the alert subscription and the pipeline snapshot it routes into.
pub struct SubscriptionController {
    bus: Arc<dyn MessageBus>,
    clients: Arc<dyn ChatClientFactory>,
    materializer: ConfigMaterializer,
    metrics: Metrics,
    config_name: String,
    topic_prefix: String,
    pipeline: Arc<ArcSwapOption<Pipeline>>,
    router: Option<JoinHandle<()>>,
    state: ControllerState,
}

impl SubscriptionController {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        clients: Arc<dyn ChatClientFactory>,
        materializer: ConfigMaterializer,
        metrics: Metrics,
    ) -> Self {
        Self {
            bus,
            clients,
            materializer,
            metrics,
            config_name: "config".to_string(),
            topic_prefix: "alerts".to_string(),
            pipeline: Arc::new(ArcSwapOption::empty()),
            router: None,
            state: ControllerState::Unconfigured,
        }
    }

    /// Sets the configuration store resource this controller reacts to.
    pub fn config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = name.into();
        self
    }

    /// Sets the topic prefix to subscribe to.
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Returns the pipeline snapshot currently used for routing.
    pub fn current_pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.load_full()
    }

    /// Reacts to a configuration store notification. Only `new` and
    /// `update` events for the watched resource are applied.
    ///
    /// # Returns
    /// * `Ok(true)` if the subscription was (re)created
    /// * `Ok(false)` if the event was ignored or the configuration is incomplete
    pub async fn handle_config_event(&mut self, event: &ConfigEvent) -> Result<bool> {
        if event.name != self.config_name {
            debug!(name = %event.name, "Ignoring change to unrelated configuration");
            return Ok(false);
        }
        match event.action {
            ConfigAction::New | ConfigAction::Update => self.configure(&event.contents).await,
            ConfigAction::Delete => {
                debug!("Configuration deleted, keeping the current subscription");
                Ok(false)
            }
        }
    }

    /// Applies raw configuration contents.
    ///
    /// On a complete configuration a chat client is built from the new token
    /// and the subscription is recreated around the new pipeline.
    #[instrument(skip_all)]
    pub async fn configure(&mut self, contents: &Value) -> Result<bool> {
        debug!("Configuring Slack health agent");
        let config = match self.materializer.materialize(contents) {
            Materialized::Complete(config) => config,
            Materialized::Incomplete { missing } => {
                self.metrics.record_incomplete_config();
                info!(?missing, state = ?self.state, "Configuration incomplete, subscription unchanged");
                return Ok(false);
            }
        };

        debug!("Setting up Slack client");
        let client = self
            .clients
            .create(&config.token)
            .context("Failed to create chat client")?;

        self.resubscribe(Pipeline::new(config, client)).await?;
        self.state = ControllerState::Active;
        self.metrics.record_reconfiguration();
        Ok(true)
    }

    /// Drops the current subscription, waits for its router to finish, then
    /// installs `pipeline` and subscribes again. If the subscription cannot
    /// be dropped the previous pipeline stays installed.
    async fn resubscribe(&mut self, pipeline: Pipeline) -> Result<()> {
        debug!("Unsubscribing from all subscriptions");
        match self.bus.unsubscribe_all().await {
            Ok(()) | Err(BusError::NotSubscribed) => {}
            Err(e) => return Err(e).context("Failed to drop the previous subscription"),
        }
        // Alerts queued before the unsubscribe finish on the old pipeline,
        // and at most one router runs at a time.
        self.drain_router().await;
        self.pipeline.store(Some(Arc::new(pipeline)));

        debug!(prefix = %self.topic_prefix, "Subscribing to all alerts");
        let subscription = self
            .bus
            .subscribe(&self.topic_prefix)
            .await
            .context("Failed to subscribe to alerts")?;
        self.router = Some(tokio::spawn(route_alerts(
            subscription,
            self.pipeline.clone(),
        )));
        Ok(())
    }

    /// Drops the subscription and waits for in-flight alerts to finish.
    pub async fn shutdown(&mut self) {
        match self.bus.unsubscribe_all().await {
            Ok(()) | Err(BusError::NotSubscribed) => {}
            Err(e) => {
                error!(error = %e, "Failed to drop subscription on shutdown");
                // The receiver is still open, so the router would never finish.
                if let Some(router) = &self.router {
                    router.abort();
                }
            }
        }
        self.drain_router().await;
        self.metrics.record_unsubscribed();
    }

    /// Waits for the current router. Its subscription must already be closed.
    async fn drain_router(&mut self) {
        if let Some(router) = self.router.take() {
            match router.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Alert router aborted"),
                Err(e) => error!(error = %e, "Alert router panicked"),
            }
        }
    }

    /// Applies the defaults once, then follows configuration events until
    /// shutdown.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ConfigEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        self.on_start();
        if let Err(e) = self.configure(&Value::Object(Default::default())).await {
            error!("Failed to apply default configuration: {:#}", e);
        }

        let mut events_open = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Subscription controller received shutdown signal.");
                    break;
                }
                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle_config_event(&event).await {
                                error!(action = %event.action, "Failed to apply configuration: {:#}", e);
                            }
                        }
                        None => {
                            debug!("Configuration event channel closed.");
                            events_open = false;
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        self.on_stop();
    }

    fn on_start(&self) {
        info!(prefix = %self.topic_prefix, config = %self.config_name, "Slack health agent starting");
    }

    fn on_stop(&self) {
        info!("Slack health agent stopped");
    }
}

/// Routes every message of one subscription through the pipeline, in order.
/// Each message is handled against a single pipeline snapshot.
async fn route_alerts(subscription: Subscription, pipeline: Arc<ArcSwapOption<Pipeline>>) {
    while let Ok(message) = subscription.recv().await {
        let Some(snapshot) = pipeline.load_full() else {
            continue;
        };
        // Render failures are logged inside the pipeline.
        let _ = snapshot.handle(&message).await;
    }
    debug!("Alert subscription closed.");
}
