//! Core domain types and service traits for the Slack health bridge
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::bus::BusError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the message header carrying the alert key.
pub const ALERT_KEY_HEADER: &str = "alert_key";

/// A single message delivered by the bus to a subscriber.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusMessage {
    /// Identity of the publishing peer, when the bus knows it.
    pub sender: String,
    /// Full topic the message was published on.
    pub topic: String,
    /// Message metadata.
    pub headers: HashMap<String, String>,
    /// Serialized message body.
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Creates a message with no sender and no headers.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Adds a header to the message.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A decoded alert, produced once per inbound bus message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertEvent {
    /// Class of the component that raised the alert.
    pub announcing_class: String,
    /// Identity of the component that raised the alert.
    pub announcing_identity: String,
    pub alert_key: Option<String>,
    pub status: Option<serde_yml::Value>,
    pub context: Option<serde_yml::Value>,
}

/// Text ready for delivery, together with its destinations.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub text: String,
    pub channels: Vec<String>,
}

/// The kind of change reported by the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigAction {
    New,
    Update,
    Delete,
}

impl fmt::Display for ConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigAction::New => write!(f, "new"),
            ConfigAction::Update => write!(f, "update"),
            ConfigAction::Delete => write!(f, "delete"),
        }
    }
}

/// A change notification from the configuration store. `contents` always
/// carries the full new value of the named resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEvent {
    pub name: String,
    pub action: ConfigAction,
    pub contents: serde_json::Value,
}

impl ConfigEvent {
    pub fn new(name: impl Into<String>, action: ConfigAction, contents: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            action,
            contents,
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Posts text messages to chat channels.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Posts `text` to `channel`.
    ///
    /// # Returns
    /// * `Ok(())` if the chat service accepted the message
    /// * `Err` on transport failures or when the service rejected the message
    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}

/// Builds chat clients from a credential. A new client is built every time
/// a complete configuration is applied.
pub trait ChatClientFactory: Send + Sync {
    fn create(&self, token: &str) -> Result<Arc<dyn ChatClient>>;
}

/// Receiving end of a bus subscription. Closed when the subscription is
/// dropped on the bus side.
pub type Subscription = async_channel::Receiver<BusMessage>;

/// A topic-based publish/subscribe bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message to every subscription whose prefix matches its topic.
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    /// Subscribes to every topic starting with `prefix`.
    async fn subscribe(&self, prefix: &str) -> Result<Subscription, BusError>;

    /// Drops every subscription held by this agent.
    ///
    /// # Returns
    /// * `Err(BusError::NotSubscribed)` if there was nothing to drop
    async fn unsubscribe_all(&self) -> Result<(), BusError>;
}
