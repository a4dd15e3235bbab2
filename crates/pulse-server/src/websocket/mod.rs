//! WebSocket connection management, dispatch, and broadcasting.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection handle: identity + outbound queue |
//! | `registry` | Session registry and fan-out: add/remove, broadcast with optional exclusion |
//! | `lifecycle` | Connect snapshot (welcome) and disconnect handling |
//! | `dispatch` | Client command parsing and effects (ignore-unknown) |
//! | `upstream` | Authority event normalization: mutate, then forward (forward-unknown) |
//!
//! ## Data Flow
//!
//! Upstream events → `upstream` → store mutation → `registry` → all clients.
//! Client commands → `dispatch` → store mutation → `registry` → all/most clients.
//! New connection → `lifecycle` reads store → welcome to the one connection,
//! join notice to the rest.

pub mod connection;
pub mod dispatch;
pub mod lifecycle;
pub mod registry;
pub mod upstream;
