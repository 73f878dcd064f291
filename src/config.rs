//! Process configuration for the Slack health agent
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all process settings. It uses the `figment`
//! crate to layer defaults, a `slack-health.toml` file, environment variables
//! and command-line arguments.
//!
//! The `[agent]` section only seeds the defaults baseline of the runtime
//! configuration; the live values come from the configuration store and are
//! handled by [`crate::runtime_config`].

use crate::cli::Cli;
use crate::runtime_config::{ROUTES_KEY, TEMPLATE_KEY, TOKEN_KEY};
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "slack-health.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Agent identity, subscription settings and runtime defaults.
    pub agent: AgentConfig,
    /// Settings for the Slack Web API client.
    pub slack: SlackConfig,
    /// Where the `config` resource is read from.
    pub config_store: ConfigStoreConfig,
    /// The HTTP endpoint that publishes alerts onto the bus.
    pub ingest: IngestConfig,
    /// Prometheus metrics exporter.
    pub metrics: MetricsConfig,
}

/// Agent identity, subscription settings and runtime defaults.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AgentConfig {
    /// Identity the agent announces itself with.
    pub identity: String,
    /// Name of the configuration store resource to watch.
    pub config_name: String,
    /// Topic prefix to subscribe to.
    pub topic_prefix: String,
    /// Default Slack bot token.
    pub slack_api_token: Option<String>,
    /// Default message template.
    pub message_template: Option<String>,
    /// Default identity → channels routing.
    pub agent_channel_config: Option<HashMap<String, Vec<String>>>,
}

impl AgentConfig {
    /// Returns the runtime defaults baseline as an untyped mapping.
    /// Unset values are null.
    pub fn runtime_defaults(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut defaults = serde_json::Map::new();
        defaults.insert(TOKEN_KEY.to_string(), serde_json::json!(self.slack_api_token));
        defaults.insert(TEMPLATE_KEY.to_string(), serde_json::json!(self.message_template));
        defaults.insert(ROUTES_KEY.to_string(), serde_json::json!(self.agent_channel_config));
        defaults
    }
}

/// Settings for the Slack Web API client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SlackConfig {
    /// Base URL of the Web API.
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

/// Location of the configuration store.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ConfigStoreConfig {
    /// A YAML or JSON file holding the `config` resource. When unset only
    /// the `[agent]` defaults are used.
    pub path: Option<PathBuf>,
}

/// The HTTP publish endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IngestConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

/// Prometheus metrics exporter.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are layered, lowest precedence first: built-in defaults, the
    /// TOML file, `SLACK_HEALTH_*` environment variables (`__` separates
    /// nested keys) and command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Configuration file not found: {}", path.display());
                }
                path.clone()
            }
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // e.g. SLACK_HEALTH_SLACK__TIMEOUT_SECONDS=5
            .merge(Env::prefixed("SLACK_HEALTH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            agent: AgentConfig {
                identity: "slack_health".to_string(),
                config_name: "config".to_string(),
                topic_prefix: "alerts".to_string(),
                slack_api_token: None,
                message_template: None,
                agent_channel_config: None,
            },
            slack: SlackConfig {
                api_base_url: "https://slack.com/api".to_string(),
                timeout_seconds: 10,
            },
            config_store: ConfigStoreConfig::default(),
            ingest: IngestConfig {
                enabled: true,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 8425)),
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
