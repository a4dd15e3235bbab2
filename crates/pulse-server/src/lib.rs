//! # pulse-server
//!
//! WebSocket server and session-state fan-out for the pulse relay.
//!
//! Two producers feed one consistent view: the external quiz authority
//! publishes events on the store's notification channel, and connected
//! clients send commands over their sockets. Both kinds of input mutate
//! the store first and fan out second, so a client that reacts to a
//! broadcast by re-reading state always observes the updated value.
//!
//! - [`websocket`]: connection registry, broadcast relay, connection
//!   lifecycle, client command dispatch, upstream event normalization
//! - [`server`]: axum router, WebSocket upgrade, per-socket read/write loops
//! - [`config`]: server configuration with environment overrides
//! - [`metrics`]: Prometheus recorder and metric names

#![deny(unsafe_code)]

pub mod config;
pub mod metrics;
pub mod server;
pub mod websocket;
