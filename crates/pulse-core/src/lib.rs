//! # pulse-core
//!
//! Shared vocabulary for the pulse live-quiz relay.
//!
//! This crate provides the types every other pulse crate depends on:
//!
//! - **Branded IDs**: [`ids::ConnectionId`] as a newtype
//! - **Session state**: [`state::UserRecord`] and [`state::LiveQuizState`]
//! - **Wire envelopes**: [`envelope::ServerMessage`] (outbound),
//!   [`envelope::ClientCommand`] (inbound commands, ignore-unknown),
//!   [`envelope::UpstreamEnvelope`] (upstream events, forward-unknown)
//! - **Errors**: [`errors::ParseError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other pulse crates.

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod state;
