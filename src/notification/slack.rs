//! A client for posting messages through the Slack Web API.

use crate::config::SlackConfig;
use crate::core::{ChatClient, ChatClientFactory};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// The subset of a Slack Web API response the client looks at.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts messages with `chat.postMessage`, authenticated by a bot token.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_base_url: String,
}

impl SlackClient {
    /// Creates a new `SlackClient`.
    pub fn new(token: String, api_base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Slack")?;
        Ok(Self {
            http,
            token,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.api_base_url, method)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let payload = json!({ "channel": channel, "text": text });
        let response = self
            .http
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to Slack failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to send Slack message");
            bail!("Failed to send Slack message: status {}, body: {}", status, body);
        }

        let api: ApiResponse = response
            .json()
            .await
            .context("Slack returned an unreadable response")?;
        if !api.ok {
            let reason = api.error.unwrap_or_else(|| "unknown_error".to_string());
            error!(reason = %reason, "Slack rejected the message");
            bail!("Slack rejected the message: {}", reason);
        }

        debug!("Successfully posted message to Slack.");
        Ok(())
    }
}

/// Builds a [`SlackClient`] for every new token.
#[derive(Debug, Clone)]
pub struct SlackClientFactory {
    config: SlackConfig,
}

impl SlackClientFactory {
    pub fn new(config: SlackConfig) -> Self {
        Self { config }
    }
}

impl ChatClientFactory for SlackClientFactory {
    fn create(&self, token: &str) -> Result<Arc<dyn ChatClient>> {
        let client = SlackClient::new(
            token.to_string(),
            self.config.api_base_url.clone(),
            Duration::from_secs(self.config.timeout_seconds),
        )?;
        Ok(Arc::new(client))
    }
}
