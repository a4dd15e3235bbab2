//! # pulse-relay
//!
//! Relay server binary — wires the store, the registry, and the upstream
//! normalizer together and starts the WebSocket server.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pulse_server::config::ServerConfig;
use pulse_server::server::{AppState, router};
use pulse_server::websocket::registry::SessionRegistry;
use pulse_server::websocket::upstream::UpstreamNormalizer;
use pulse_store::{QuizStore, RedisQuizStore};

/// pulse relay server.
#[derive(Parser, Debug)]
#[command(name = "pulse-relay", about = "Live quiz session relay server")]
struct Cli {
    /// Host to bind (overrides `PULSE_HOST` if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides `PORT` if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Store connection URL (overrides `REDIS_URL` if specified).
    #[arg(long)]
    redis_url: Option<String>,

    /// Notification channel to subscribe to (overrides `PULSE_CHANNEL`).
    #[arg(long)]
    channel: Option<String>,

    /// Minimum log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Environment-derived config with CLI flags layered on top.
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(redis_url) = self.redis_url {
            config.redis_url = redis_url;
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pulse_core::logging::init_subscriber(&cli.log_level);
    let config = cli.into_config();

    let metrics_handle = pulse_server::metrics::install_recorder();

    let store = RedisQuizStore::connect(&config.redis_url, config.store_timeout())
        .await
        .with_context(|| format!("connecting to store at {}", config.redis_url))?;
    let store: Arc<dyn QuizStore> = Arc::new(store);

    let registry = Arc::new(SessionRegistry::new());

    let events = store
        .subscribe(&config.channel)
        .await
        .with_context(|| format!("subscribing to channel {}", config.channel))?;
    let normalizer = UpstreamNormalizer::new(Arc::clone(&registry), Arc::clone(&store));
    drop(tokio::spawn(normalizer.run(events)));
    info!(channel = %config.channel, "listening for upstream events");

    let state = AppState::new(registry, store, Some(metrics_handle));
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "relay server up");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
