//! The decode → render → dispatch pipeline for one alert.

use crate::core::{BusMessage, ChatClient, RenderedMessage};
use crate::decoder;
use crate::formatting::{render_message, RenderError};
use crate::notification::dispatcher::{dispatch, DeliveryReport};
use crate::runtime_config::RuntimeConfig;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// An immutable snapshot of everything needed to forward alerts: the
/// validated configuration and the chat client built from its token.
pub struct Pipeline {
    config: RuntimeConfig,
    client: Arc<dyn ChatClient>,
}

impl Pipeline {
    pub fn new(config: RuntimeConfig, client: Arc<dyn ChatClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Processes one bus message end to end.
    ///
    /// # Returns
    /// * `Ok(DeliveryReport)` describing which channels accepted the message
    /// * `Err(RenderError)` if the configured template cannot be rendered
    #[instrument(skip_all, fields(topic = %message.topic))]
    pub async fn handle(&self, message: &BusMessage) -> Result<DeliveryReport, RenderError> {
        metrics::counter!("alerts_received_total").increment(1);
        let event = decoder::decode(message);

        let channels = self.config.channels_for(&event.announcing_identity);
        if channels.is_empty() {
            debug!(
                identity = %event.announcing_identity,
                "No channels configured for agent, alert not forwarded"
            );
            return Ok(DeliveryReport::default());
        }

        let text = render_message(&self.config.template, &event).map_err(|e| {
            metrics::counter!("render_failures_total").increment(1);
            error!(
                identity = %event.announcing_identity,
                error = %e,
                "Failed to render alert message"
            );
            e
        })?;
        let message = RenderedMessage {
            text,
            channels: channels.to_vec(),
        };

        let report = dispatch(self.client.as_ref(), &message).await;
        info!(
            identity = %event.announcing_identity,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Alert forwarded"
        );
        Ok(report)
    }
}
