//! Server configuration.
//!
//! Two layers, in priority order: compiled defaults, then `PULSE_*` /
//! `PORT` / `REDIS_URL` environment variables. The binary's CLI flags sit
//! on top of both (handled in `pulse-relay`).

use std::time::Duration;

use tracing::warn;

/// Default WebSocket listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default store address.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
/// Default notification channel the authority publishes on.
pub const DEFAULT_CHANNEL: &str = "notifications";
/// Default bound on one remote store call, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// Runtime configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Store connection URL.
    pub redis_url: String,
    /// Notification channel to subscribe to.
    pub channel: String,
    /// Bound on one remote store call, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            redis_url: DEFAULT_REDIS_URL.to_owned(),
            channel: DEFAULT_CHANNEL.to_owned(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by environment variables where set.
    ///
    /// Unparseable numeric values are logged and fall back to the default
    /// rather than aborting startup.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("PULSE_HOST") {
            config.host = host;
        }
        if let Ok(raw) = std::env::var("PORT") {
            match raw.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(%raw, "ignoring unparseable PORT"),
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(channel) = std::env::var("PULSE_CHANNEL") {
            config.channel = channel;
        }
        if let Ok(raw) = std::env::var("PULSE_STORE_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => config.store_timeout_ms = ms,
                Err(_) => warn!(%raw, "ignoring unparseable PULSE_STORE_TIMEOUT_MS"),
            }
        }
        config
    }

    /// Store call bound as a [`Duration`].
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Bind address as `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
