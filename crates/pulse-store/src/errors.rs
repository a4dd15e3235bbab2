//! Store error taxonomy.
//!
//! Every store failure is non-fatal by policy: the caller logs it, skips
//! the mutation it was attempting, and keeps serving every connection.
//! A timeout is treated identically to an unavailable store.

use std::time::Duration;

use thiserror::Error;

/// Failure of a remote (or in-memory) store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or dropped the request.
    #[error("store unavailable: {source}")]
    Unavailable {
        /// Underlying client failure.
        #[from]
        source: redis::RedisError,
    },

    /// The bounded per-call timeout elapsed before a response arrived.
    #[error("store call timed out after {elapsed_ms}ms")]
    Timeout {
        /// Configured bound that was exceeded.
        elapsed_ms: u64,
    },

    /// The store answered, but a stored value failed to decode.
    #[error("undecodable store value in `{field}`: {message}")]
    Decode {
        /// Field or key holding the bad value.
        field: String,
        /// What was wrong with it.
        message: String,
    },
}

impl StoreError {
    /// Timeout error for a call bounded by `limit`.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout {
            elapsed_ms: limit.as_millis() as u64,
        }
    }

    /// Decode error for a named field.
    #[must_use]
    pub fn decode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reports_bound() {
        let err = StoreError::timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn decode_names_the_field() {
        let err = StoreError::decode("liveTotalScore", "not an integer");
        assert!(err.to_string().contains("liveTotalScore"));
        assert!(err.to_string().contains("not an integer"));
    }
}
