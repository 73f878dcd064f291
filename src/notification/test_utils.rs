//! Fake chat clients for tests.

use crate::core::{ChatClient, ChatClientFactory};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A chat client that records every message instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct FakeChatClient {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failing_channels: Arc<HashSet<String>>,
    delays: Arc<HashMap<String, Duration>>,
    notifier: Arc<Notify>,
}

impl FakeChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every post to `channel` fail.
    pub fn failing_on(mut self, channel: &str) -> Self {
        let mut failing = (*self.failing_channels).clone();
        failing.insert(channel.to_string());
        self.failing_channels = Arc::new(failing);
        self
    }

    /// Makes every post of exactly `text` take `delay` before it is recorded.
    pub fn delayed_on(mut self, text: &str, delay: Duration) -> Self {
        let mut delays = (*self.delays).clone();
        delays.insert(text.to_string(), delay);
        self.delays = Arc::new(delays);
        self
    }

    /// Returns the `(channel, text)` pairs that were delivered.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Waits until at least `count` messages were delivered.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notifier.notified();
                if self.sent.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for chat messages");
    }
}

#[async_trait]
impl ChatClient for FakeChatClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_channels.contains(channel) {
            bail!("simulated delivery failure to {}", channel);
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        self.notifier.notify_waiters();
        Ok(())
    }
}

/// Hands out one shared [`FakeChatClient`] and records the tokens it was
/// asked to build clients for.
#[derive(Clone, Debug, Default)]
pub struct FakeChatClientFactory {
    pub client: FakeChatClient,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl FakeChatClientFactory {
    pub fn new(client: FakeChatClient) -> Self {
        Self {
            client,
            tokens: Arc::default(),
        }
    }

    /// Returns every token a client was created for, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl ChatClientFactory for FakeChatClientFactory {
    fn create(&self, token: &str) -> Result<Arc<dyn ChatClient>> {
        self.tokens.lock().unwrap().push(token.to_string());
        Ok(Arc::new(self.client.clone()))
    }
}
