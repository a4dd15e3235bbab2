//! Branded ID newtypes for type safety.
//!
//! Connection identities are process-local and time-ordered (UUID v7), so
//! log lines for one session sort chronologically.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-local identity of one WebSocket connection.
///
/// Distinct from the user name: several open connections (reconnect before
/// the old socket noticed, multiple tabs) may carry the same user name, but
/// each gets its own `ConnectionId`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("conn-1");
        assert_eq!(id.to_string(), "conn-1");
        assert_eq!(id.as_str(), "conn-1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConnectionId::from("conn-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn-1\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
