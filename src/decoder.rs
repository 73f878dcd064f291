//! Alert decoding.
//!
//! Alerts arrive on topics shaped like `alerts/<agent_class>/<agent_identity>`
//! with a YAML (or JSON) body carrying `status` and `context`. Decoding never
//! fails: every field that cannot be extracted degrades to empty or absent.
//!
//! The class segment is greedy, so `alerts/foo/bar/ag1` decodes as class
//! `foo/bar` and identity `ag1`.

use crate::core::{AlertEvent, BusMessage, ALERT_KEY_HEADER};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static TOPIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^alerts/(?P<agent_class>.*)/(?P<agent_identity>.*)$")
        .expect("topic pattern is a valid regex")
});

/// Extracts `(class, identity)` from an alert topic.
pub fn parse_topic(topic: &str) -> Option<(String, String)> {
    let captures = TOPIC_PATTERN.captures(topic)?;
    Some((
        captures["agent_class"].to_string(),
        captures["agent_identity"].to_string(),
    ))
}

/// Parses an alert body and returns its `(status, context)` fields.
///
/// Only a mapping body carries fields; any other shape, invalid UTF-8 or
/// unparsable YAML yields `(None, None)`. Null values count as absent.
pub fn parse_payload(payload: &[u8]) -> (Option<serde_yml::Value>, Option<serde_yml::Value>) {
    let content = match std::str::from_utf8(payload) {
        Ok(text) => match serde_yml::from_str::<serde_yml::Value>(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Alert payload is not valid YAML");
                return (None, None);
            }
        },
        Err(e) => {
            debug!(error = %e, "Alert payload is not valid UTF-8");
            return (None, None);
        }
    };

    let Some(mapping) = content.as_mapping() else {
        return (None, None);
    };
    let field = |name: &str| mapping.get(name).filter(|v| !v.is_null()).cloned();
    (field("status"), field("context"))
}

/// Decodes a bus message into an [`AlertEvent`]. Topics that do not match
/// `alerts/<class>/<identity>` are counted in `alerts_unparsed_topic_total`.
pub fn decode(message: &BusMessage) -> AlertEvent {
    let (announcing_class, announcing_identity) = parse_topic(&message.topic).unwrap_or_else(|| {
        metrics::counter!("alerts_unparsed_topic_total").increment(1);
        info!(
            sender = %message.sender,
            topic = %message.topic,
            "Alerts from sender do not follow the \"alerts/{{agent_class}}/{{agent_identity}}\" template"
        );
        (String::new(), String::new())
    });
    let (status, context) = parse_payload(&message.payload);

    AlertEvent {
        announcing_class,
        announcing_identity,
        alert_key: message.headers.get(ALERT_KEY_HEADER).cloned(),
        status,
        context,
    }
}
