//! The [`QuizStore`] trait — the typed boundary to the session-state store.
//!
//! The contract is deliberately narrow: every operation touches a single
//! key, and single-key atomicity is all the store promises. There is no
//! transaction spanning a user record and the globals; the lifecycle and
//! normalizer layers are designed around that (read-then-write,
//! best-effort).

use async_trait::async_trait;
use futures::stream::BoxStream;

use pulse_core::state::UserRecord;

use crate::errors::StoreError;

/// One typed field of a [`UserRecord`], for single-field atomic updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserField {
    /// `liveQuestionNumber` — question index the user is on.
    QuestionNumber(i64),
    /// `liveTotalScore` — accumulated score (always a real value; the
    /// "no score yet" state is only ever produced by reads).
    TotalScore(i64),
    /// `isLoggedIn` — whether a connection for the user is open.
    LoggedIn(bool),
}

/// Result of a conditional single-field update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record existed and the field was written.
    Applied,
    /// No record for that name; nothing was written.
    NotFound,
}

/// Typed operations over the external session-state store.
///
/// All methods may fail with [`StoreError`]; callers treat failures as
/// non-fatal (log, skip the mutation, continue serving).
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Fetch one user record by name.
    async fn get_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create or replace one user record.
    async fn put_user(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Atomically update one field of an existing record.
    async fn update_user_field(
        &self,
        name: &str,
        field: UserField,
    ) -> Result<UpdateOutcome, StoreError>;

    /// List every persisted user record.
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Identifier of the in-progress quiz, if any.
    async fn get_quiz_id(&self) -> Result<Option<String>, StoreError>;

    /// Set the in-progress quiz identifier.
    async fn set_quiz_id(&self, id: &str) -> Result<(), StoreError>;

    /// Clear the in-progress quiz identifier.
    async fn clear_quiz_id(&self) -> Result<(), StoreError>;

    /// Session-wide broadcast question index, if a quiz is active.
    async fn get_question_number(&self) -> Result<Option<i64>, StoreError>;

    /// Set the session-wide question index.
    async fn set_question_number(&self, number: i64) -> Result<(), StoreError>;

    /// Clear the session-wide question index.
    async fn clear_question_number(&self) -> Result<(), StoreError>;

    /// Subscribe to a named notification channel.
    ///
    /// Yields raw message payloads as published; the stream ends when the
    /// underlying connection does.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, StoreError>;
}
