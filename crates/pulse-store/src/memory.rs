//! In-process [`QuizStore`] with the same contract as the Redis backend.
//!
//! Backs unit and integration tests, and local development without a
//! running store. The pub/sub side is a `tokio::sync::broadcast` channel;
//! [`MemoryQuizStore::publish`] plays the role of the external authority.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use pulse_core::state::UserRecord;

use crate::errors::StoreError;
use crate::store::{QuizStore, UpdateOutcome, UserField};

/// Buffered notifications per subscriber before lag drops the oldest.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
struct Notification {
    channel: String,
    payload: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    quiz_id: Option<String>,
    question_number: Option<i64>,
}

/// In-memory store adapter.
pub struct MemoryQuizStore {
    inner: RwLock<Inner>,
    notifications: broadcast::Sender<Notification>,
}

impl MemoryQuizStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            notifications,
        }
    }

    /// Publish a raw payload on a channel, as the external authority would.
    ///
    /// Returns the number of live subscribers that will see it.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        self.notifications
            .send(Notification {
                channel: channel.to_owned(),
                payload: payload.to_owned(),
            })
            .unwrap_or(0)
    }
}

impl Default for MemoryQuizStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuizStore for MemoryQuizStore {
    async fn get_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().users.get(name).cloned())
    }

    async fn put_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let _ = self
            .inner
            .write()
            .users
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn update_user_field(
        &self,
        name: &str,
        field: UserField,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut inner = self.inner.write();
        let Some(record) = inner.users.get_mut(name) else {
            return Ok(UpdateOutcome::NotFound);
        };
        match field {
            UserField::QuestionNumber(n) => record.live_question_number = n,
            UserField::TotalScore(n) => record.live_total_score = Some(n),
            UserField::LoggedIn(flag) => record.is_logged_in = flag,
        }
        Ok(UpdateOutcome::Applied)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users: Vec<UserRecord> = self.inner.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn get_quiz_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().quiz_id.clone())
    }

    async fn set_quiz_id(&self, id: &str) -> Result<(), StoreError> {
        self.inner.write().quiz_id = Some(id.to_owned());
        Ok(())
    }

    async fn clear_quiz_id(&self) -> Result<(), StoreError> {
        self.inner.write().quiz_id = None;
        Ok(())
    }

    async fn get_question_number(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.read().question_number)
    }

    async fn set_question_number(&self, number: i64) -> Result<(), StoreError> {
        self.inner.write().question_number = Some(number);
        Ok(())
    }

    async fn clear_question_number(&self) -> Result<(), StoreError> {
        self.inner.write().question_number = None;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, StoreError> {
        let rx = self.notifications.subscribe();
        let wanted = channel.to_owned();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let wanted = wanted.clone();
            async move {
                match item {
                    Ok(n) if n.channel == wanted => Some(n.payload),
                    // Lagged subscribers skip dropped messages; other
                    // channels are simply not ours.
                    _ => None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
