//! Slack health agent
//!
//! Subscribes to `alerts/<class>/<identity>` on the bus and forwards each
//! alert to the Slack channels configured for the announcing component.

use anyhow::Result;
use clap::Parser;
use slack_health::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    // RUST_LOG, when set, takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Slack health agent starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Identity: {}", config.agent.identity);
    info!("Topic Prefix: {}", config.agent.topic_prefix);
    info!("Configuration Resource: {}", config.agent.config_name);
    match &config.config_store.path {
        Some(path) => info!("Configuration Store: {}", path.display()),
        None => info!("Configuration Store: Not configured"),
    }
    info!(
        "Default Slack Token: {}",
        if config.agent.slack_api_token.is_some() {
            "Set"
        } else {
            "Not set"
        }
    );
    info!("Slack API: {}", config.slack.api_base_url);
    info!("Slack Timeout: {}s", config.slack.timeout_seconds);
    if config.ingest.enabled {
        info!("Ingest Endpoint: {}", config.ingest.listen_address);
    } else {
        info!("Ingest Endpoint: Disabled");
    }
    if config.metrics.enabled {
        info!("Metrics Endpoint: {}", config.metrics.listen_address);
    } else {
        info!("Metrics Endpoint: Disabled");
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    app.run().await
}
