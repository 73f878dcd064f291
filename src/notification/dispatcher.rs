//! Delivers rendered messages to their channels.
//!
//! Every channel is attempted independently and in order. A failing channel
//! is logged and recorded in the [`DeliveryReport`]; it never stops the
//! remaining channels. There is no retry.

use crate::core::{ChatClient, RenderedMessage};
use tracing::{debug, warn};

/// Per-channel outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    /// Channels that accepted the message.
    pub delivered: Vec<String>,
    /// Channels that failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    /// Returns the number of channels that were attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

/// Sends `message.text` to each of `message.channels`.
pub async fn dispatch(client: &dyn ChatClient, message: &RenderedMessage) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for channel in &message.channels {
        debug!(
            channel = %channel,
            text = %message.text,
            "Sending message to Slack channel"
        );
        match client.post_message(channel, &message.text).await {
            Ok(()) => {
                metrics::counter!("notifications_sent_total").increment(1);
                report.delivered.push(channel.clone());
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                warn!(channel = %channel, error = %e, "Failed to deliver message");
                report.failed.push((channel.clone(), e.to_string()));
            }
        }
    }

    report
}
