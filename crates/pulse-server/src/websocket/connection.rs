//! Per-connection handle shared between the registry and the socket task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use pulse_core::ids::ConnectionId;

/// Outbound queue depth per connection.
///
/// Sized so a briefly stalled client survives a burst of broadcasts; a
/// client that stays behind long enough to overflow it repeatedly gets
/// disconnected by the registry.
pub const OUTBOUND_BUFFER: usize = 256;

/// One open WebSocket connection.
///
/// The socket task owns the receiving half of the queue and writes frames
/// out; everything else holds this handle and enqueues with [`send`].
///
/// [`send`]: ClientConnection::send
pub struct ClientConnection {
    /// Process-local connection identity.
    pub id: ConnectionId,
    /// User identity bound at connect time; immutable for the connection's
    /// lifetime. Not unique among open connections.
    pub user_name: String,
    sender: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

impl ClientConnection {
    /// Create a handle over the outbound queue's sending half.
    #[must_use]
    pub fn new(id: ConnectionId, user_name: String, sender: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            user_name,
            sender,
            drops: AtomicU64::new(0),
        }
    }

    /// Enqueue one outbound payload without blocking.
    ///
    /// Returns `false` when the queue is full or the socket task is gone;
    /// the payload is dropped and the lifetime drop counter advances.
    /// Delivery is best-effort by design — a connection that closes
    /// mid-broadcast simply does not receive the message.
    pub fn send(&self, payload: Arc<String>) -> bool {
        match self.sender.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Total payloads dropped on this connection so far.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(buffer: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            ClientConnection::new(ConnectionId::new(), "teacher".into(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (conn, mut rx) = make(4);
        assert!(conn.send(Arc::new("hello".to_owned())));
        assert_eq!(rx.recv().await.unwrap().as_str(), "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_counts_drops() {
        let (conn, _rx) = make(1);
        assert!(conn.send(Arc::new("one".to_owned())));
        assert!(!conn.send(Arc::new("two".to_owned())));
        assert!(!conn.send(Arc::new("three".to_owned())));
        assert_eq!(conn.drop_count(), 2);
    }

    #[tokio::test]
    async fn closed_receiver_counts_drops() {
        let (conn, rx) = make(4);
        drop(rx);
        assert!(!conn.send(Arc::new("gone".to_owned())));
        assert_eq!(conn.drop_count(), 1);
    }
}
