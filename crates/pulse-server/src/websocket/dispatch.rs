//! Client command dispatch.
//!
//! One inbound text frame is one command. The command set is closed:
//! unrecognized `messageType`s are ignored (unlike upstream events, which
//! are forwarded — that asymmetry is protocol behavior). Malformed input
//! is logged and dropped; the connection stays open either way, and no
//! failure here ever disturbs another connection.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use pulse_core::envelope::{ClientCommand, ServerMessage};
use pulse_store::QuizStore;

use crate::metrics::CLIENT_COMMANDS_TOTAL;

use super::connection::ClientConnection;
use super::registry::SessionRegistry;

/// Applies client commands and relays their effects.
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn QuizStore>,
}

impl CommandDispatcher {
    /// Create a dispatcher over the shared registry and store.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn QuizStore>) -> Self {
        Self { registry, store }
    }

    /// Handle one raw inbound frame from `connection`.
    pub async fn handle(&self, connection: &ClientConnection, raw: &str) {
        let command = match ClientCommand::parse(raw) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(conn_id = %connection.id, "ignoring unrecognized client command");
                return;
            }
            Err(error) => {
                warn!(conn_id = %connection.id, %error, "dropping malformed client message");
                return;
            }
        };

        match command {
            ClientCommand::Ping => {
                counter!(CLIENT_COMMANDS_TOTAL, "command" => "ping").increment(1);
                reply(connection, &ServerMessage::Pong);
            }

            ClientCommand::Chat { content, user_name } => {
                counter!(CLIENT_COMMANDS_TOTAL, "command" => "chat").increment(1);
                // The payload may claim a sender; the connection's bound
                // identity is the fallback, never a requirement.
                let user_name = user_name.unwrap_or_else(|| connection.user_name.clone());
                self.registry
                    .broadcast_all(&ServerMessage::Chat { content, user_name })
                    .await;
            }

            ClientCommand::TerminateLiveQuiz => {
                counter!(CLIENT_COMMANDS_TOTAL, "command" => "terminate").increment(1);
                // Clear both globals before anyone hears the quiz ended, so
                // a client reacting to the broadcast reads "no quiz".
                if let Err(error) = self.store.clear_quiz_id().await {
                    warn!(%error, "failed to clear quiz id on terminate");
                }
                if let Err(error) = self.store.clear_question_number().await {
                    warn!(%error, "failed to clear question number on terminate");
                }
                self.registry
                    .broadcast_all(&ServerMessage::LiveQuizTerminated)
                    .await;
            }

            ClientCommand::StudentAcknowledgedLiveQuestionNumber => {
                counter!(CLIENT_COMMANDS_TOTAL, "command" => "acknowledge").increment(1);
                // Accepted without effect; bookkeeping may attach here later.
                debug!(conn_id = %connection.id, user = %connection.user_name, "student acknowledged question number");
            }
        }
    }
}

/// Queue a reply on the issuing connection only.
fn reply(connection: &ClientConnection, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if !connection.send(Arc::new(json)) {
                debug!(conn_id = %connection.id, "reply dropped (queue full or closed)");
            }
        }
        Err(error) => warn!(conn_id = %connection.id, %error, "failed to serialize reply"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
