//! Parse error taxonomy for inbound payloads.
//!
//! Parse failures are always handled locally at the point of occurrence:
//! the offending payload is logged and dropped, the connection (or the
//! upstream subscription) keeps running. Nothing here propagates far enough
//! to crash the process or disturb another connection.

use thiserror::Error;

/// Failure to turn a raw text payload into a typed message.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload is not valid JSON at all.
    #[error("payload is not valid JSON: {source}")]
    InvalidJson {
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },

    /// Payload is JSON but lacks the `messageType` discriminator.
    #[error("payload has no string `messageType` discriminator")]
    MissingType,

    /// `messageType` is recognized but the rest of the payload does not
    /// match that type's schema.
    #[error("invalid `{message_type}` payload: {source}")]
    InvalidFields {
        /// The recognized discriminator value.
        message_type: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    /// Wrap a serde failure on the outer JSON document.
    #[must_use]
    pub fn invalid_json(source: serde_json::Error) -> Self {
        Self::InvalidJson { source }
    }

    /// Wrap a serde failure on a recognized message type's fields.
    #[must_use]
    pub fn invalid_fields(message_type: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidFields {
            message_type: message_type.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serde_err() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").unwrap_err()
    }

    #[test]
    fn display_includes_message_type() {
        let err = ParseError::invalid_fields("chat", serde_err());
        assert!(err.to_string().contains("chat"));
    }

    #[test]
    fn is_std_error_with_source() {
        let err = ParseError::invalid_json(serde_err());
        let dyn_err: &dyn std::error::Error = &err;
        assert!(dyn_err.source().is_some());
    }

    #[test]
    fn missing_type_has_no_source() {
        let err = ParseError::MissingType;
        let dyn_err: &dyn std::error::Error = &err;
        assert!(dyn_err.source().is_none());
    }
}
