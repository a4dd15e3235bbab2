//! Session registry and message fan-out to connected clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use pulse_core::envelope::ServerMessage;
use pulse_core::ids::ConnectionId;

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

use super::connection::ClientConnection;

/// Maximum total lifetime message drops before forcibly disconnecting a slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Concurrency-safe table of currently open connections.
///
/// Shared by the lifecycle handler, the command dispatcher, and the
/// upstream normalizer; all three add/remove/broadcast concurrently.
pub struct SessionRegistry {
    /// Open connections indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Atomic counter tracking open connections (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Broadcast a server message to every open connection.
    pub async fn broadcast_all(&self, message: &ServerMessage) {
        self.broadcast_message(message, None).await;
    }

    /// Broadcast a server message to every open connection except one.
    pub async fn broadcast_except(&self, message: &ServerMessage, exclude: &ConnectionId) {
        self.broadcast_message(message, Some(exclude)).await;
    }

    /// Forward a raw payload verbatim to every open connection.
    ///
    /// Used for upstream events: clients receive exactly the bytes the
    /// authority published, including message types this server does not
    /// recognize.
    pub async fn broadcast_raw(&self, payload: &str, exclude: Option<&ConnectionId>) {
        self.fan_out(Arc::new(payload.to_owned()), exclude, "raw")
            .await;
    }

    async fn broadcast_message(&self, message: &ServerMessage, exclude: Option<&ConnectionId>) {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize server message");
                return;
            }
        };
        self.fan_out(json, exclude, "server").await;
    }

    /// Fan a serialized payload out to matching clients, remove slow clients.
    async fn fan_out(&self, payload: Arc<String>, exclude: Option<&ConnectionId>, label: &str) {
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            let mut recipients = 0u32;
            for conn in conns.values() {
                if exclude.is_some_and(|id| *id == conn.id) {
                    continue;
                }
                recipients += 1;
                if !conn.send(Arc::clone(&payload)) {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(conn_id = %conn.id, label, drops, "disconnecting slow client");
                        to_remove.push(conn.id.clone());
                    } else {
                        warn!(conn_id = %conn.id, label, total_drops = drops, "failed to send message to client (channel full)");
                    }
                }
            }
            debug!(label, recipients, "broadcast message");
        }
        if !to_remove.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &to_remove {
                if conns.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Snapshot of every currently open connection.
    pub async fn snapshot_open(&self) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns.values().cloned().collect()
    }

    /// Whether any open connection other than `exclude` is bound to `user_name`.
    pub async fn has_other_connection_for(
        &self,
        user_name: &str,
        exclude: &ConnectionId,
    ) -> bool {
        let conns = self.connections.read().await;
        conns
            .values()
            .any(|c| c.user_name == user_name && c.id != *exclude)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
