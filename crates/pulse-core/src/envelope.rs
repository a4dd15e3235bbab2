//! Wire envelopes for the relay protocol.
//!
//! Three message families share the `messageType` discriminator:
//!
//! - **[`ServerMessage`]**: everything this server originates toward clients.
//! - **[`ClientCommand`]**: the closed set of commands clients may send.
//!   Unrecognized types are *ignored* ([`ClientCommand::parse`] returns
//!   `Ok(None)`).
//! - **[`UpstreamEnvelope`]**: events published by the external authority.
//!   Unrecognized types are *forwarded verbatim* to clients, so the parsed
//!   form keeps the raw discriminator instead of rejecting it.
//!
//! The ignore-unknown / forward-unknown asymmetry between the two inbound
//! families is intentional protocol behavior, not an accident of parsing.
//!
//! All field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParseError;
use crate::state::UserRecord;

// ─────────────────────────────────────────────────────────────────────────────
// ServerMessage — outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Messages this server sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Snapshot sent to a newly connected client, and to nobody else.
    WelcomeMessage {
        /// Human-readable greeting.
        content: String,
        /// The connecting user's own identity.
        #[serde(rename = "userName")]
        user_name: String,
        /// Logged-in users at snapshot time, excluding the connecting user.
        #[serde(rename = "otherConnectedUsers")]
        other_connected_users: Vec<UserRecord>,
        /// In-progress quiz id, `null` when no quiz is active.
        #[serde(rename = "liveQuizId")]
        live_quiz_id: Option<String>,
        /// Broadcast question index, `0` when no quiz is active.
        #[serde(rename = "liveQuestionNumber")]
        live_question_number: i64,
    },

    /// A new user connected; delivered to everyone except that user.
    AnotherUserJoined {
        /// The joining user's identity.
        #[serde(rename = "userName")]
        user_name: String,
    },

    /// A user's connection closed; delivered to everyone except that user.
    UserDisconnected {
        /// The departing user's identity.
        #[serde(rename = "userName")]
        user_name: String,
    },

    /// Chat relayed to every open connection, sender included.
    Chat {
        /// Chat body, passed through untouched.
        content: Value,
        /// Sending user's identity.
        #[serde(rename = "userName")]
        user_name: String,
    },

    /// The live quiz was terminated and global quiz state cleared.
    LiveQuizTerminated,

    /// Keepalive reply, sent only to the pinging connection.
    Pong,
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientCommand — inbound, closed set, ignore-unknown
// ─────────────────────────────────────────────────────────────────────────────

/// Commands a connected client may send.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "messageType", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Protocol keepalive.
    Ping,

    /// Chat message to relay to all open connections.
    Chat {
        /// Chat body, relayed untouched.
        #[serde(default)]
        content: Value,
        /// Sender identity claimed in the payload; the connection's bound
        /// name is used when absent.
        #[serde(rename = "userName", default)]
        user_name: Option<String>,
    },

    /// End the live quiz: clear global quiz state, notify everyone.
    TerminateLiveQuiz,

    /// A student confirmed receipt of the current question number.
    ///
    /// Accepted and acknowledged; carries no state mutation today. The wire
    /// literal keeps the protocol's historical spelling.
    #[serde(rename = "student_acknowleged_live_question_number")]
    StudentAcknowledgedLiveQuestionNumber,
}

/// Discriminators [`ClientCommand::parse`] recognizes.
const KNOWN_COMMANDS: [&str; 4] = [
    "ping",
    "chat",
    "terminate_live_quiz",
    "student_acknowleged_live_question_number",
];

impl ClientCommand {
    /// Parse one inbound text frame.
    ///
    /// Returns `Ok(None)` for well-formed JSON carrying an unrecognized
    /// `messageType` — those are silently ignored per protocol. Malformed
    /// JSON, a missing discriminator, or bad fields on a recognized type
    /// are errors for the caller to log and drop.
    pub fn parse(raw: &str) -> Result<Option<Self>, ParseError> {
        let value: Value = serde_json::from_str(raw).map_err(ParseError::invalid_json)?;
        let Some(message_type) = value.get("messageType").and_then(Value::as_str) else {
            return Err(ParseError::MissingType);
        };
        if !KNOWN_COMMANDS.contains(&message_type) {
            return Ok(None);
        }
        let message_type = message_type.to_owned();
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ParseError::invalid_fields(message_type, e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UpstreamEnvelope — inbound, open set, forward-unknown
// ─────────────────────────────────────────────────────────────────────────────

/// Recognized upstream event kinds, plus the forward-compatible default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamKind {
    /// A quiz started (or changed): `content` is the quiz id.
    LiveQuizId,
    /// The session-wide question index advanced.
    LiveQuestionNumber,
    /// One user fetched their question: per-user question index update.
    LiveQuestionRetrieved,
    /// A score delta for one user.
    LiveScore,
    /// Anything else; forwarded to clients without a mutation.
    Unknown,
}

/// A parsed upstream notification.
///
/// Parsing keeps the envelope loose on purpose: the discriminator stays a
/// raw string so unknown event types survive the round trip, and `content`
/// stays untyped because its meaning depends on the kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEnvelope {
    /// Raw discriminator as published.
    pub message_type: String,
    /// Subject user for per-user events.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Event payload; numeric for question/score events, id for quiz start.
    #[serde(default)]
    pub content: Value,
}

impl UpstreamEnvelope {
    /// Parse one raw payload off the notification channel.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(raw).map_err(ParseError::invalid_json)?;
        if value.get("messageType").and_then(Value::as_str).is_none() {
            return Err(ParseError::MissingType);
        }
        serde_json::from_value(value).map_err(ParseError::invalid_json)
    }

    /// Classify the discriminator.
    #[must_use]
    pub fn kind(&self) -> UpstreamKind {
        match self.message_type.as_str() {
            "live_quiz_id" => UpstreamKind::LiveQuizId,
            "live_question_number" => UpstreamKind::LiveQuestionNumber,
            "live_question_retrieved" => UpstreamKind::LiveQuestionRetrieved,
            "live_score" => UpstreamKind::LiveScore,
            _ => UpstreamKind::Unknown,
        }
    }

    /// `content` as an integer, accepting both JSON numbers and numeric
    /// strings (the authority publishes store values, which arrive as text).
    #[must_use]
    pub fn content_i64(&self) -> Option<i64> {
        match &self.content {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `content` as a string, stringifying bare numbers.
    #[must_use]
    pub fn content_string(&self) -> Option<String> {
        match &self.content {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParseError;

    // -- ServerMessage --

    #[test]
    fn welcome_message_wire_shape() {
        let msg = ServerMessage::WelcomeMessage {
            content: "hello".into(),
            user_name: "student1".into(),
            other_connected_users: vec![UserRecord::new("teacher")],
            live_quiz_id: None,
            live_question_number: 0,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["messageType"], "welcome_message");
        assert_eq!(json["userName"], "student1");
        assert_eq!(json["liveQuizId"], Value::Null);
        assert_eq!(json["liveQuestionNumber"], 0);
        assert_eq!(json["otherConnectedUsers"][0]["name"], "teacher");
    }

    #[test]
    fn welcome_message_with_active_quiz() {
        let msg = ServerMessage::WelcomeMessage {
            content: "hello".into(),
            user_name: "a".into(),
            other_connected_users: vec![],
            live_quiz_id: Some("quiz-7".into()),
            live_question_number: 3,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["liveQuizId"], "quiz-7");
        assert_eq!(json["liveQuestionNumber"], 3);
    }

    #[test]
    fn join_and_disconnect_tags() {
        let join = ServerMessage::AnotherUserJoined {
            user_name: "student1".into(),
        };
        let gone = ServerMessage::UserDisconnected {
            user_name: "student1".into(),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap()["messageType"],
            "another_user_joined"
        );
        assert_eq!(
            serde_json::to_value(&gone).unwrap()["messageType"],
            "user_disconnected"
        );
    }

    #[test]
    fn unit_variants_serialize_with_tag_only() {
        let json = serde_json::to_value(&ServerMessage::LiveQuizTerminated).unwrap();
        assert_eq!(json, serde_json::json!({"messageType": "live_quiz_terminated"}));
        let json = serde_json::to_value(&ServerMessage::Pong).unwrap();
        assert_eq!(json, serde_json::json!({"messageType": "pong"}));
    }

    // -- ClientCommand --

    #[test]
    fn parse_ping() {
        let cmd = ClientCommand::parse(r#"{"messageType":"ping"}"#).unwrap();
        assert_eq!(cmd, Some(ClientCommand::Ping));
    }

    #[test]
    fn parse_chat_with_user() {
        let cmd = ClientCommand::parse(
            r#"{"messageType":"chat","content":"hi all","userName":"teacher"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Some(ClientCommand::Chat {
                content: Value::String("hi all".into()),
                user_name: Some("teacher".into()),
            })
        );
    }

    #[test]
    fn parse_chat_without_user() {
        let cmd = ClientCommand::parse(r#"{"messageType":"chat","content":"hi"}"#).unwrap();
        match cmd {
            Some(ClientCommand::Chat { user_name, .. }) => assert_eq!(user_name, None),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parse_terminate() {
        let cmd = ClientCommand::parse(r#"{"messageType":"terminate_live_quiz"}"#).unwrap();
        assert_eq!(cmd, Some(ClientCommand::TerminateLiveQuiz));
    }

    #[test]
    fn parse_acknowledge_keeps_historical_spelling() {
        let cmd = ClientCommand::parse(
            r#"{"messageType":"student_acknowleged_live_question_number"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Some(ClientCommand::StudentAcknowledgedLiveQuestionNumber)
        );
    }

    #[test]
    fn unknown_command_is_ignored_not_error() {
        let cmd = ClientCommand::parse(r#"{"messageType":"start_disco_mode"}"#).unwrap();
        assert_eq!(cmd, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = ClientCommand::parse("{not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
    }

    #[test]
    fn missing_discriminator_is_an_error() {
        let err = ClientCommand::parse(r#"{"content":"hi"}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingType));
    }

    #[test]
    fn non_string_discriminator_is_an_error() {
        let err = ClientCommand::parse(r#"{"messageType":7}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingType));
    }

    // -- UpstreamEnvelope --

    #[test]
    fn upstream_known_kinds() {
        let cases = [
            ("live_quiz_id", UpstreamKind::LiveQuizId),
            ("live_question_number", UpstreamKind::LiveQuestionNumber),
            ("live_question_retrieved", UpstreamKind::LiveQuestionRetrieved),
            ("live_score", UpstreamKind::LiveScore),
            ("something_else", UpstreamKind::Unknown),
        ];
        for (tag, kind) in cases {
            let env =
                UpstreamEnvelope::parse(&format!(r#"{{"messageType":"{tag}"}}"#)).unwrap();
            assert_eq!(env.kind(), kind, "tag {tag}");
        }
    }

    #[test]
    fn upstream_score_event_fields() {
        let env = UpstreamEnvelope::parse(
            r#"{"messageType":"live_score","userName":"student1","content":5}"#,
        )
        .unwrap();
        assert_eq!(env.kind(), UpstreamKind::LiveScore);
        assert_eq!(env.user_name.as_deref(), Some("student1"));
        assert_eq!(env.content_i64(), Some(5));
    }

    #[test]
    fn upstream_numeric_string_content() {
        let env = UpstreamEnvelope::parse(
            r#"{"messageType":"live_question_number","content":"4"}"#,
        )
        .unwrap();
        assert_eq!(env.content_i64(), Some(4));
    }

    #[test]
    fn upstream_quiz_id_content_string() {
        let env = UpstreamEnvelope::parse(
            r#"{"messageType":"live_quiz_id","content":"quiz-42"}"#,
        )
        .unwrap();
        assert_eq!(env.content_string().as_deref(), Some("quiz-42"));

        let env =
            UpstreamEnvelope::parse(r#"{"messageType":"live_quiz_id","content":42}"#).unwrap();
        assert_eq!(env.content_string().as_deref(), Some("42"));
    }

    #[test]
    fn upstream_missing_content_is_parseable() {
        let env = UpstreamEnvelope::parse(r#"{"messageType":"live_score"}"#).unwrap();
        assert_eq!(env.content_i64(), None);
        assert_eq!(env.content_string(), None);
    }

    #[test]
    fn upstream_malformed_is_an_error() {
        assert!(UpstreamEnvelope::parse("no json here").is_err());
        assert!(UpstreamEnvelope::parse(r#"{"content":1}"#).is_err());
    }
}
