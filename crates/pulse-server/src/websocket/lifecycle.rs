//! Connection lifecycle: the connect snapshot and disconnect handling.
//!
//! The connect path is the consistency-sensitive part of the whole relay.
//! The store offers no multi-key transaction, so the handler does a
//! best-effort consistent read (record, roster, globals) *before*
//! registering the connection and sending the welcome snapshot. A
//! concurrent upstream mutation landing between the read and the send can
//! be missed by this one client; that race is tolerated by design, because
//! every subsequent change reaches the client as a broadcast.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use pulse_core::envelope::ServerMessage;
use pulse_core::ids::ConnectionId;
use pulse_core::state::{LiveQuizState, UserRecord};
use pulse_store::{QuizStore, UpdateOutcome, UserField};

use super::connection::ClientConnection;
use super::registry::SessionRegistry;

/// Greeting carried in every welcome snapshot.
const WELCOME_CONTENT: &str = "Welcome to the live quiz session";

/// Handles connect and disconnect for every client socket.
pub struct ConnectionLifecycle {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn QuizStore>,
}

impl ConnectionLifecycle {
    /// Create a handler over the shared registry and store.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn QuizStore>) -> Self {
        Self { registry, store }
    }

    /// Bring a new connection up to date and make it visible to others.
    ///
    /// Order matters and is load-bearing:
    /// 1. read state (record, roster, globals),
    /// 2. register the connection,
    /// 3. queue the welcome snapshot on the new connection,
    /// 4. broadcast the join notice to everyone else.
    ///
    /// The join notice never precedes the welcome, so no client learns of
    /// this connection before its snapshot is queued for delivery.
    pub async fn on_connect(
        &self,
        user_name: &str,
        sender: mpsc::Sender<Arc<String>>,
    ) -> Arc<ClientConnection> {
        let record = self.login(user_name).await;
        let roster = self.roster_excluding(user_name).await;
        let globals = self.quiz_globals().await;

        let connection = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            record.name.clone(),
            sender,
        ));
        self.registry.add(Arc::clone(&connection)).await;

        let welcome = ServerMessage::WelcomeMessage {
            content: WELCOME_CONTENT.to_owned(),
            user_name: record.name.clone(),
            other_connected_users: roster,
            live_quiz_id: globals.live_quiz_id,
            live_question_number: globals.live_question_number.unwrap_or(0),
        };
        send_to(&connection, &welcome);

        self.registry
            .broadcast_except(
                &ServerMessage::AnotherUserJoined {
                    user_name: record.name.clone(),
                },
                &connection.id,
            )
            .await;

        debug!(conn_id = %connection.id, user = %record.name, "connection established");
        connection
    }

    /// Tear a connection down and tell the others.
    ///
    /// The login flag only flips to false once the *last* connection for
    /// the name closes; a second tab or an overlapping reconnect keeps the
    /// record logged in. The record itself is never deleted.
    pub async fn on_disconnect(&self, connection: &ClientConnection) {
        self.registry.remove(&connection.id).await;

        let still_connected = self
            .registry
            .has_other_connection_for(&connection.user_name, &connection.id)
            .await;
        if still_connected {
            debug!(user = %connection.user_name, "other connections remain; keeping login flag");
        } else {
            match self
                .store
                .update_user_field(&connection.user_name, UserField::LoggedIn(false))
                .await
            {
                Ok(UpdateOutcome::Applied) => {}
                Ok(UpdateOutcome::NotFound) => {
                    debug!(user = %connection.user_name, "no record to mark logged out");
                }
                Err(error) => {
                    warn!(user = %connection.user_name, %error, "failed to mark user logged out");
                }
            }
        }

        self.registry
            .broadcast_except(
                &ServerMessage::UserDisconnected {
                    user_name: connection.user_name.clone(),
                },
                &connection.id,
            )
            .await;

        debug!(conn_id = %connection.id, user = %connection.user_name, "connection closed");
    }

    /// Load-or-create the user's record with the login flag set.
    ///
    /// A store failure downgrades to a fresh in-memory record: the client
    /// is served either way, and the next successful write reconverges.
    async fn login(&self, user_name: &str) -> UserRecord {
        match self.store.get_user(user_name).await {
            Ok(Some(mut record)) => {
                record.is_logged_in = true;
                if let Err(error) = self.store.put_user(&record).await {
                    warn!(user = user_name, %error, "failed to persist login flag");
                }
                record
            }
            Ok(None) => {
                let record = UserRecord::new(user_name);
                if let Err(error) = self.store.put_user(&record).await {
                    warn!(user = user_name, %error, "failed to persist new user record");
                }
                record
            }
            Err(error) => {
                warn!(user = user_name, %error, "store read failed on connect, serving a fresh record");
                UserRecord::new(user_name)
            }
        }
    }

    /// Logged-in users other than the connecting one.
    async fn roster_excluding(&self, user_name: &str) -> Vec<UserRecord> {
        match self.store.list_users().await {
            Ok(users) => users
                .into_iter()
                .filter(|u| u.is_logged_in && u.name != user_name)
                .collect(),
            Err(error) => {
                warn!(%error, "failed to list users for welcome roster");
                Vec::new()
            }
        }
    }

    /// Global quiz fields, with store failures reading as "no quiz".
    async fn quiz_globals(&self) -> LiveQuizState {
        let live_quiz_id = self.store.get_quiz_id().await.unwrap_or_else(|error| {
            warn!(%error, "failed to read quiz id for welcome snapshot");
            None
        });
        let live_question_number =
            self.store.get_question_number().await.unwrap_or_else(|error| {
                warn!(%error, "failed to read question number for welcome snapshot");
                None
            });
        LiveQuizState {
            live_quiz_id,
            live_question_number,
        }
    }
}

/// Queue one message on a single connection.
fn send_to(connection: &ClientConnection, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if !connection.send(Arc::new(json)) {
                warn!(conn_id = %connection.id, "failed to queue direct message");
            }
        }
        Err(error) => warn!(conn_id = %connection.id, %error, "failed to serialize direct message"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
