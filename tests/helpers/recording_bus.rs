//! A bus that records subscription calls on top of a real `LocalBus`.

use async_trait::async_trait;
use slack_health::bus::{BusError, LocalBus};
use slack_health::core::{BusMessage, MessageBus, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingBus {
    inner: LocalBus,
    calls: Mutex<Vec<String>>,
    fail_unsubscribe: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `subscribe` and `unsubscribe` call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count()
    }

    /// Makes `unsubscribe_all` fail with `BusError::Unavailable`.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        self.inner.publish(message).await
    }

    async fn subscribe(&self, prefix: &str) -> Result<Subscription, BusError> {
        let result = self.inner.subscribe(prefix).await;
        self.calls.lock().unwrap().push("subscribe".to_string());
        result
    }

    async fn unsubscribe_all(&self) -> Result<(), BusError> {
        self.calls.lock().unwrap().push("unsubscribe".to_string());
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("connection lost".to_string()));
        }
        self.inner.unsubscribe_all().await
    }
}
