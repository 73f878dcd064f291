//! # Ingest Server
//!
//! A small HTTP front door to the in-process bus. Components that are not
//! linked into this process publish alerts with
//!
//! ```text
//! POST /publish/alerts/<class>/<identity>
//! x-alert-key: heartbeat
//!
//! status: GOOD
//! context: all checks passed
//! ```
//!
//! The body is published verbatim; decoding happens on the subscriber side.

use crate::bus::BusError;
use crate::core::{BusMessage, MessageBus, ALERT_KEY_HEADER};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// HTTP header carrying the alert key.
pub const ALERT_KEY_HTTP_HEADER: &str = "x-alert-key";

/// HTTP header carrying the publishing component's identity.
pub const SENDER_HTTP_HEADER: &str = "x-sender";

/// Publishes HTTP requests onto the bus.
pub struct IngestServer {
    listener: TcpListener,
    bus: Arc<dyn MessageBus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl IngestServer {
    /// Creates a new `IngestServer` but does not spawn it.
    pub fn new(
        listener: TcpListener,
        bus: Arc<dyn MessageBus>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            bus,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let app = router(self.bus);
        let listener = self.listener;
        let mut shutdown_rx = self.shutdown_rx;

        async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
                trace!("Ingest server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Ingest server error: {}", e);
            }
            trace!("Ingest server task finished.");
        }
    }
}

fn router(bus: Arc<dyn MessageBus>) -> Router {
    Router::new()
        .route("/publish/{*topic}", post(publish))
        .with_state(bus)
}

async fn publish(
    State(bus): State<Arc<dyn MessageBus>>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut message = BusMessage::new(topic, body.to_vec());
    if let Some(key) = header_str(&headers, ALERT_KEY_HTTP_HEADER) {
        message = message.with_header(ALERT_KEY_HEADER, key);
    }
    if let Some(sender) = header_str(&headers, SENDER_HTTP_HEADER) {
        message.sender = sender.to_string();
    }

    debug!(topic = %message.topic, "Publishing message from ingest endpoint");
    match bus.publish(message).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(BusError::Unavailable(reason)) => {
            warn!(%reason, "Bus unavailable, message rejected");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            error!(error = %e, "Failed to publish message");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
