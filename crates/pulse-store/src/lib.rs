//! # pulse-store
//!
//! State store adapter for the pulse relay.
//!
//! The authoritative session state (per-user records, global quiz fields)
//! lives in an external Redis-compatible store that is also written by the
//! quiz authority process. This crate is the only place that knows the
//! store-native representation:
//!
//! - **[`QuizStore`]**: the typed adapter trait — single-key operations
//!   only, no multi-key transactions. Higher layers are designed around
//!   that constraint.
//! - **[`RedisQuizStore`]**: the production backend. User records are
//!   hashes under `user:<name>`, globals are plain strings, and the
//!   notification channel rides Redis pub/sub.
//! - **[`MemoryQuizStore`]**: an in-process backend with the same contract,
//!   used by tests and local development.
//! - **[`StoreError`]**: unavailable / timeout / decode. Callers treat all
//!   of these as non-fatal: log, skip the mutation, keep serving.
//!
//! Sentinel normalization happens here and nowhere else: the legacy score
//! placeholder the authority writes (and a wholly absent score field) both
//! surface as `UserRecord::live_total_score == None`.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use errors::StoreError;
pub use memory::MemoryQuizStore;
pub use redis_store::RedisQuizStore;
pub use store::{QuizStore, UpdateOutcome, UserField};
