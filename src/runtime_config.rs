//! Runtime configuration materialization.
//!
//! The configuration store hands over an untyped mapping. `ConfigMaterializer`
//! layers it over the process defaults, checks the shape of every field and
//! decides whether the result is complete enough to start forwarding alerts.
//! Malformed fields never abort: they are replaced by safe defaults and a
//! warning is logged.

use crate::formatting::MessageTemplate;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

pub const TOKEN_KEY: &str = "slack_api_token";
pub const TEMPLATE_KEY: &str = "message_template";
pub const ROUTES_KEY: &str = "agent_channel_config";

/// Template used when none (or a non-string one) is configured.
pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "Agent {agent_identity} ({agent_class}) health is {agent_status} ({alert_key}) with {status_context}";

/// Maps an announcing identity to the channels its alerts go to.
pub type Routes = HashMap<String, Vec<String>>;

/// A validated configuration snapshot.
#[derive(Clone, PartialEq)]
pub struct RuntimeConfig {
    pub token: String,
    pub template: String,
    pub routes: Routes,
}

impl RuntimeConfig {
    /// Returns the destination channels for `identity`, or an empty slice.
    pub fn channels_for(&self, identity: &str) -> &[String] {
        self.routes.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("token", &"[REDACTED]")
            .field("template", &self.template)
            .field("routes", &self.routes)
            .finish()
    }
}

/// Outcome of materializing a raw configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    /// Every required field is usable.
    Complete(RuntimeConfig),
    /// At least one required field is empty; `missing` names them.
    Incomplete { missing: Vec<&'static str> },
}

impl Materialized {
    pub fn is_complete(&self) -> bool {
        matches!(self, Materialized::Complete(_))
    }
}

/// Turns raw configuration contents into a [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    defaults: Map<String, Value>,
}

impl Default for ConfigMaterializer {
    fn default() -> Self {
        let mut defaults = Map::new();
        defaults.insert(TOKEN_KEY.to_string(), Value::Null);
        defaults.insert(TEMPLATE_KEY.to_string(), Value::Null);
        defaults.insert(ROUTES_KEY.to_string(), Value::Null);
        Self { defaults }
    }
}

impl ConfigMaterializer {
    /// Creates a materializer with the given defaults baseline. Keys not
    /// present in `defaults` start out as null.
    pub fn new(defaults: Map<String, Value>) -> Self {
        let mut materializer = Self::default();
        materializer.defaults.extend(defaults);
        materializer
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Layers `raw` over the defaults and validates the result.
    pub fn materialize(&self, raw: &Value) -> Materialized {
        let mut merged = self.defaults.clone();
        match raw {
            Value::Object(contents) => {
                merged.extend(contents.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Value::Null => {}
            other => warn!(
                kind = value_kind(other),
                "Supplied configuration is not a mapping, ignored"
            ),
        }

        let token = validate_token(merged.get(TOKEN_KEY));
        let template = validate_template(merged.get(TEMPLATE_KEY));
        let routes = validate_routes(merged.get(ROUTES_KEY));

        let mut missing = Vec::new();
        if token.is_empty() {
            missing.push(TOKEN_KEY);
        }
        if template.is_empty() {
            missing.push(TEMPLATE_KEY);
        }
        if routes.is_empty() {
            missing.push(ROUTES_KEY);
        }
        if !missing.is_empty() {
            debug!(?missing, "Configuration is incomplete");
            return Materialized::Incomplete { missing };
        }

        if let Err(e) = MessageTemplate::parse(&template) {
            warn!(error = %e, "Supplied message_template cannot be rendered, every alert will fail");
        }

        Materialized::Complete(RuntimeConfig {
            token,
            template,
            routes,
        })
    }
}

fn validate_token(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(token)) => token.clone(),
        _ => {
            warn!("Supplied slack_api_token is not a string, ignored");
            String::new()
        }
    }
}

fn validate_template(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(template)) => template.clone(),
        _ => {
            warn!("Supplied message_template is not a string, using default");
            DEFAULT_MESSAGE_TEMPLATE.to_string()
        }
    }
}

fn validate_routes(value: Option<&Value>) -> Routes {
    let Some(Value::Object(entries)) = value else {
        warn!("Supplied agent_channel_config is not a mapping, nothing will be published to Slack!");
        return Routes::new();
    };

    let mut routes = Routes::with_capacity(entries.len());
    for (identity, channels) in entries {
        let Value::Array(items) = channels else {
            warn!(
                identity = %identity,
                kind = value_kind(channels),
                "Channel list is not a list, route ignored"
            );
            continue;
        };
        let mut valid = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(channel) => valid.push(channel.clone()),
                other => warn!(
                    identity = %identity,
                    kind = value_kind(other),
                    "Channel name is not a string, ignored"
                ),
            }
        }
        routes.insert(identity.clone(), valid);
    }
    routes
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
