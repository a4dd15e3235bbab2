//! Session state owned by the external store.
//!
//! [`UserRecord`] is the persisted per-user row; [`LiveQuizState`] carries
//! the two scalar globals describing the quiz in progress. Both types are
//! the *domain* view: "no score yet" and "no quiz active" are real `Option`s
//! here, never sentinel values. The store adapter is responsible for
//! translating store-native representations (absent fields, the legacy
//! numeric sentinel) into these options on read.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A persisted per-user record.
///
/// Created on first connect for a name and updated in place thereafter.
/// Never deleted on disconnect — only `is_logged_in` flips — so scores and
/// progress survive reconnection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Stable identity, derived from the connection path at connect time.
    pub name: String,
    /// Question index the user is currently on.
    pub live_question_number: i64,
    /// Accumulated score; `None` until the first score event lands.
    ///
    /// On the wire clients always see a number: `None` serializes as `0`.
    #[serde(
        serialize_with = "score_to_wire",
        deserialize_with = "score_from_wire",
        default
    )]
    pub live_total_score: Option<i64>,
    /// Whether any connection for this name is currently open.
    pub is_logged_in: bool,
}

impl UserRecord {
    /// A fresh record for a user connecting for the first time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            live_question_number: 0,
            live_total_score: None,
            is_logged_in: true,
        }
    }

    /// Current score with the "no score yet" case normalized to 0.
    #[must_use]
    pub fn score_or_default(&self) -> i64 {
        self.live_total_score.unwrap_or(0)
    }
}

fn score_to_wire<S: Serializer>(score: &Option<i64>, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_i64(score.unwrap_or(0))
}

fn score_from_wire<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    let value = i64::deserialize(de)?;
    Ok(Some(value))
}

/// The two scalar globals describing the quiz in progress.
///
/// Both fields are `None` exactly when no quiz is active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveQuizState {
    /// Identifier of the in-progress quiz.
    pub live_quiz_id: Option<String>,
    /// Currently broadcast question index for the whole session.
    pub live_question_number: Option<i64>,
}

impl LiveQuizState {
    /// Whether a quiz is currently in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.live_quiz_id.is_some()
    }
}
