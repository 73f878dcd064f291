//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `slack-health.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Forwards agent health alerts from the message bus to Slack channels.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging level (e.g. "debug", "info,slack_health=trace").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// YAML or JSON file holding the agent's `config` resource.
    #[arg(long, value_name = "FILE")]
    pub config_store: Option<PathBuf>,

    /// Address of the HTTP publish endpoint.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Enable or disable the Prometheus metrics endpoint (`--metrics true`).
    #[arg(long)]
    pub metrics: Option<bool>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            insert_path(&mut dict, "log_level", Value::from(level.clone()));
        }

        if let Some(path) = &self.config_store {
            insert_path(
                &mut dict,
                "config_store.path",
                Value::from(path.to_string_lossy().into_owned()),
            );
        }

        if let Some(addr) = &self.listen {
            insert_path(&mut dict, "ingest.listen_address", Value::from(addr.clone()));
        }

        if let Some(enabled) = self.metrics {
            insert_path(&mut dict, "metrics.enabled", Value::from(enabled));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

/// Inserts `value` under a dotted `path`, creating intermediate tables.
fn insert_path(dict: &mut Dict, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            dict.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = dict
                .entry(head.to_string())
                .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}
