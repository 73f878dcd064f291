//! In-process topic bus.
//!
//! `LocalBus` routes published messages to every subscription whose prefix
//! matches the message topic. Each subscription gets its own ordered,
//! unbounded queue, so delivery is in publish order per topic.

use crate::core::{BusMessage, MessageBus, Subscription};
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("no active subscription")]
    NotSubscribed,

    #[error("bus is unavailable: {0}")]
    Unavailable(String),
}

struct Subscriber {
    prefix: String,
    tx: async_channel::Sender<BusMessage>,
}

/// A bus that lives entirely inside the process.
#[derive(Default)]
pub struct LocalBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.len())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Subscriber>>, BusError> {
        self.subscribers
            .lock()
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        let mut subscribers = self.lock()?;
        // Receivers that went away are pruned on the next publish.
        subscribers.retain(|sub| !sub.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers.iter() {
            if message.topic.starts_with(&sub.prefix) && sub.tx.try_send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(topic = %message.topic, delivered, "Published message");
        Ok(())
    }

    async fn subscribe(&self, prefix: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = async_channel::unbounded();
        self.lock()?.push(Subscriber {
            prefix: prefix.to_string(),
            tx,
        });
        debug!(prefix, "Subscription created");
        Ok(rx)
    }

    async fn unsubscribe_all(&self) -> Result<(), BusError> {
        let mut subscribers = self.lock()?;
        if subscribers.is_empty() {
            return Err(BusError::NotSubscribed);
        }
        let dropped = subscribers.len();
        subscribers.clear();
        debug!(dropped, "Dropped all subscriptions");
        Ok(())
    }
}
