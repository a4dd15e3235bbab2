//! Redis-backed [`QuizStore`].
//!
//! Layout in the store (shared with the quiz authority process, so it is a
//! wire format, not an implementation detail):
//!
//! - `user:<name>` — hash with fields `name`, `liveQuestionNumber`,
//!   `liveTotalScore`, `isLoggedIn`, all stored as strings.
//! - `live:quiz_id`, `live:question_number` — plain string keys; absence
//!   means "no quiz active".
//! - notifications — a pub/sub channel carrying raw JSON payloads.
//!
//! The authority historically wrote `999` as a "no score yet" placeholder;
//! both that value and a wholly absent score field decode to `None` here,
//! so no other layer ever sees the sentinel.
//!
//! Every command runs against a [`ConnectionManager`] (auto-reconnecting)
//! under a bounded timeout; a timeout surfaces as [`StoreError::Timeout`]
//! and is handled by callers exactly like an unavailable store.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use pulse_core::state::UserRecord;

use crate::errors::StoreError;
use crate::store::{QuizStore, UpdateOutcome, UserField};

/// Key prefix for user record hashes.
const USER_KEY_PREFIX: &str = "user:";
/// Key holding the in-progress quiz identifier.
const QUIZ_ID_KEY: &str = "live:quiz_id";
/// Key holding the session-wide question index.
const QUESTION_NUMBER_KEY: &str = "live:question_number";

/// Hash field names, shared with the authority process.
const FIELD_NAME: &str = "name";
const FIELD_QUESTION: &str = "liveQuestionNumber";
const FIELD_SCORE: &str = "liveTotalScore";
const FIELD_LOGGED_IN: &str = "isLoggedIn";

/// Legacy "no score yet" placeholder the authority writes into new records.
const LEGACY_SCORE_SENTINEL: i64 = 999;

/// SCAN batch size for [`QuizStore::list_users`].
const SCAN_COUNT: usize = 100;

/// Default bound for one remote call.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Redis-backed store adapter.
pub struct RedisQuizStore {
    client: redis::Client,
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisQuizStore {
    /// Connect to the store at `url` (e.g. `redis://localhost:6379`).
    ///
    /// `op_timeout` bounds every subsequent remote call.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!(url, "connected to session-state store");
        Ok(Self {
            client,
            conn,
            op_timeout,
        })
    }

    /// Connect with [`DEFAULT_OP_TIMEOUT`].
    pub async fn connect_default(url: &str) -> Result<Self, StoreError> {
        Self::connect(url, DEFAULT_OP_TIMEOUT).await
    }

    /// Run one store command under the configured timeout.
    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(StoreError::from(source)),
            Err(_) => Err(StoreError::timeout(self.op_timeout)),
        }
    }

    /// Collect every `user:*` key with a cursor SCAN.
    async fn scan_user_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.timed(async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(format!("{USER_KEY_PREFIX}*"))
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(keys)
        })
        .await
    }

    async fn fetch_user_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let key = key.to_owned();
        self.timed(async move {
            let map: HashMap<String, String> =
                redis::cmd("HGETALL").arg(&key).query_async(&mut conn).await?;
            Ok(map)
        })
        .await
    }

    async fn get_scalar(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let key = key.to_owned();
        self.timed(async move {
            let value: Option<String> =
                redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn set_scalar(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = key.to_owned();
        self.timed(async move {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete_scalar(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = key.to_owned();
        self.timed(async move {
            let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

fn user_key(name: &str) -> String {
    format!("{USER_KEY_PREFIX}{name}")
}

/// Hash representation of a record, ready for HSET.
///
/// `None` scores write no field at all; the pair list is accompanied by a
/// flag telling the caller to HDEL any stale score field.
fn encode_user(record: &UserRecord) -> (Vec<(&'static str, String)>, bool) {
    let mut pairs = vec![
        (FIELD_NAME, record.name.clone()),
        (FIELD_QUESTION, record.live_question_number.to_string()),
        (
            FIELD_LOGGED_IN,
            if record.is_logged_in { "true" } else { "false" }.to_owned(),
        ),
    ];
    match record.live_total_score {
        Some(score) => {
            pairs.push((FIELD_SCORE, score.to_string()));
            (pairs, false)
        }
        None => (pairs, true),
    }
}

/// Decode a user hash, normalizing the legacy score sentinel to `None`.
///
/// `fallback_name` (derived from the key) covers records the authority
/// wrote without a `name` field.
fn decode_user(
    fallback_name: &str,
    map: &HashMap<String, String>,
) -> Result<UserRecord, StoreError> {
    let name = map
        .get(FIELD_NAME)
        .cloned()
        .unwrap_or_else(|| fallback_name.to_owned());

    let live_question_number = match map.get(FIELD_QUESTION) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StoreError::decode(FIELD_QUESTION, format!("`{raw}` is not an integer")))?,
        None => 0,
    };

    let live_total_score = match map.get(FIELD_SCORE) {
        Some(raw) => {
            let value: i64 = raw
                .trim()
                .parse()
                .map_err(|_| StoreError::decode(FIELD_SCORE, format!("`{raw}` is not an integer")))?;
            if value == LEGACY_SCORE_SENTINEL {
                None
            } else {
                Some(value)
            }
        }
        None => None,
    };

    let is_logged_in = map
        .get(FIELD_LOGGED_IN)
        .is_some_and(|raw| matches!(raw.trim(), "true" | "1"));

    Ok(UserRecord {
        name,
        live_question_number,
        live_total_score,
        is_logged_in,
    })
}

fn field_to_pair(field: &UserField) -> (&'static str, String) {
    match field {
        UserField::QuestionNumber(n) => (FIELD_QUESTION, n.to_string()),
        UserField::TotalScore(n) => (FIELD_SCORE, n.to_string()),
        UserField::LoggedIn(flag) => (
            FIELD_LOGGED_IN,
            if *flag { "true" } else { "false" }.to_owned(),
        ),
    }
}

#[async_trait]
impl QuizStore for RedisQuizStore {
    async fn get_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        let map = self.fetch_user_hash(&user_key(name)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        decode_user(name, &map).map(Some)
    }

    async fn put_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let key = user_key(&record.name);
        let (pairs, clear_score) = encode_user(record);
        let mut conn = self.conn.clone();
        self.timed(async move {
            let mut pipe = redis::pipe();
            let _ = pipe.hset_multiple(&key, &pairs).ignore();
            if clear_score {
                let _ = pipe.hdel(&key, FIELD_SCORE).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn update_user_field(
        &self,
        name: &str,
        field: UserField,
    ) -> Result<UpdateOutcome, StoreError> {
        let key = user_key(name);
        let (hash_field, value) = field_to_pair(&field);
        let mut conn = self.conn.clone();
        self.timed(async move {
            let exists: bool = redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await?;
            if !exists {
                return Ok(UpdateOutcome::NotFound);
            }
            let _: () = redis::cmd("HSET")
                .arg(&key)
                .arg(hash_field)
                .arg(&value)
                .query_async(&mut conn)
                .await?;
            Ok(UpdateOutcome::Applied)
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let keys = self.scan_user_keys().await?;
        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            let map = self.fetch_user_hash(&key).await?;
            if map.is_empty() {
                continue;
            }
            let fallback = key.strip_prefix(USER_KEY_PREFIX).unwrap_or(&key);
            match decode_user(fallback, &map) {
                Ok(record) => users.push(record),
                // One bad record must not hide the rest of the roster.
                Err(error) => warn!(%key, %error, "skipping undecodable user record"),
            }
        }
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn get_quiz_id(&self) -> Result<Option<String>, StoreError> {
        self.get_scalar(QUIZ_ID_KEY).await
    }

    async fn set_quiz_id(&self, id: &str) -> Result<(), StoreError> {
        self.set_scalar(QUIZ_ID_KEY, id.to_owned()).await
    }

    async fn clear_quiz_id(&self) -> Result<(), StoreError> {
        self.delete_scalar(QUIZ_ID_KEY).await
    }

    async fn get_question_number(&self) -> Result<Option<i64>, StoreError> {
        match self.get_scalar(QUESTION_NUMBER_KEY).await? {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| {
                    StoreError::decode(QUESTION_NUMBER_KEY, format!("`{raw}` is not an integer"))
                }),
        }
    }

    async fn set_question_number(&self, number: i64) -> Result<(), StoreError> {
        self.set_scalar(QUESTION_NUMBER_KEY, number.to_string())
            .await
    }

    async fn clear_question_number(&self) -> Result<(), StoreError> {
        self.delete_scalar(QUESTION_NUMBER_KEY).await
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, StoreError> {
        // Pub/sub needs a dedicated connection; the manager multiplexes
        // request/response traffic and cannot carry a subscription.
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "subscribed to notification channel");
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(stream.boxed())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn user_key_is_prefixed() {
        assert_eq!(user_key("student1"), "user:student1");
    }

    #[test]
    fn decode_full_record() {
        let map = hash(&[
            ("name", "teacher"),
            ("liveQuestionNumber", "3"),
            ("liveTotalScore", "12"),
            ("isLoggedIn", "true"),
        ]);
        let rec = decode_user("teacher", &map).unwrap();
        assert_eq!(rec.name, "teacher");
        assert_eq!(rec.live_question_number, 3);
        assert_eq!(rec.live_total_score, Some(12));
        assert!(rec.is_logged_in);
    }

    #[test]
    fn decode_normalizes_legacy_sentinel_to_none() {
        let map = hash(&[("liveTotalScore", "999"), ("isLoggedIn", "false")]);
        let rec = decode_user("a", &map).unwrap();
        assert_eq!(rec.live_total_score, None);
    }

    #[test]
    fn decode_treats_absent_score_as_none() {
        let map = hash(&[("name", "a"), ("liveQuestionNumber", "0")]);
        let rec = decode_user("a", &map).unwrap();
        assert_eq!(rec.live_total_score, None);
    }

    #[test]
    fn decode_keeps_real_zero_score() {
        // 0 is a legitimate score, distinct from "no score yet".
        let map = hash(&[("liveTotalScore", "0")]);
        let rec = decode_user("a", &map).unwrap();
        assert_eq!(rec.live_total_score, Some(0));
    }

    #[test]
    fn decode_falls_back_to_key_name() {
        let map = hash(&[("isLoggedIn", "1")]);
        let rec = decode_user("student1", &map).unwrap();
        assert_eq!(rec.name, "student1");
        assert!(rec.is_logged_in);
    }

    #[test]
    fn decode_rejects_garbage_numbers() {
        let map = hash(&[("liveQuestionNumber", "three")]);
        let err = decode_user("a", &map).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));

        let map = hash(&[("liveTotalScore", "lots")]);
        assert!(decode_user("a", &map).is_err());
    }

    #[test]
    fn encode_writes_score_only_when_set() {
        let rec = UserRecord::new("a");
        let (pairs, clear_score) = encode_user(&rec);
        assert!(clear_score);
        assert!(pairs.iter().all(|(field, _)| *field != FIELD_SCORE));

        let rec = UserRecord {
            live_total_score: Some(5),
            ..UserRecord::new("a")
        };
        let (pairs, clear_score) = encode_user(&rec);
        assert!(!clear_score);
        assert!(pairs.contains(&(FIELD_SCORE, "5".to_owned())));
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = UserRecord {
            name: "student1".into(),
            live_question_number: 4,
            live_total_score: Some(9),
            is_logged_in: true,
        };
        let (pairs, _) = encode_user(&original);
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        let decoded = decode_user("student1", &map).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn field_pairs_match_wire_names() {
        assert_eq!(
            field_to_pair(&UserField::QuestionNumber(2)),
            (FIELD_QUESTION, "2".to_owned())
        );
        assert_eq!(
            field_to_pair(&UserField::TotalScore(17)),
            (FIELD_SCORE, "17".to_owned())
        );
        assert_eq!(
            field_to_pair(&UserField::LoggedIn(false)),
            (FIELD_LOGGED_IN, "false".to_owned())
        );
    }
}
