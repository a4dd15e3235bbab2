//! Structured logging setup with `tracing`.
//!
//! One relay process has exactly one subscriber, writing human-readable
//! output to stderr. Per-connection context (connection id, user name)
//! travels in event fields rather than spans, matching how short-lived
//! the per-event work is.

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at process startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level when `RUST_LOG` is unset, e.g. `"info"`.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init is a no-op if a subscriber is already set
    let _ = subscriber.try_init();
}
