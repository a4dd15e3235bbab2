//! Upstream event normalization: mutate state, then forward.
//!
//! The quiz authority publishes raw JSON payloads on the store's
//! notification channel. For every recognized event the required store
//! mutation must complete (or be logged as failed) *before* the payload is
//! forwarded, so a client that reacts to the broadcast by re-reading state
//! observes the updated value. That ordering is the load-bearing invariant
//! of this module.
//!
//! Unrecognized event types carry no mutation but are still forwarded
//! verbatim, so newer authority versions can reach clients through an
//! older relay.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use metrics::counter;
use tracing::{debug, error, info, warn};

use pulse_core::envelope::{UpstreamEnvelope, UpstreamKind};
use pulse_store::{QuizStore, UpdateOutcome, UserField};

use crate::metrics::{UPSTREAM_DROPPED_TOTAL, UPSTREAM_EVENTS_TOTAL};

use super::registry::SessionRegistry;

/// Consumes the notification stream and relays events to clients.
pub struct UpstreamNormalizer {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn QuizStore>,
}

impl UpstreamNormalizer {
    /// Create a normalizer over the shared registry and store.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn QuizStore>) -> Self {
        Self { registry, store }
    }

    /// Drain the notification stream until it ends.
    pub async fn run(self, mut events: BoxStream<'static, String>) {
        info!("upstream normalizer running");
        while let Some(payload) = events.next().await {
            self.handle(&payload).await;
        }
        info!("upstream notification stream ended");
    }

    /// Normalize one raw payload: apply its mutation, then forward it.
    ///
    /// Unparseable payloads are dropped. A failed mutation is logged and
    /// the payload is forwarded anyway — clients prefer a momentarily
    /// stale store over a silently missing event.
    pub async fn handle(&self, raw: &str) {
        let envelope = match UpstreamEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(parse_error) => {
                counter!(UPSTREAM_DROPPED_TOTAL).increment(1);
                error!(%parse_error, "dropping malformed upstream payload");
                return;
            }
        };
        counter!(UPSTREAM_EVENTS_TOTAL, "kind" => kind_label(envelope.kind())).increment(1);

        match envelope.kind() {
            UpstreamKind::LiveQuizId => self.apply_quiz_id(&envelope).await,
            UpstreamKind::LiveQuestionNumber => self.apply_question_number(&envelope).await,
            UpstreamKind::LiveQuestionRetrieved => self.apply_question_retrieved(&envelope).await,
            UpstreamKind::LiveScore => self.apply_score_delta(&envelope).await,
            UpstreamKind::Unknown => {
                debug!(message_type = %envelope.message_type, "forwarding unrecognized upstream event");
            }
        }

        // Mutation settled (applied or logged) — now fan out verbatim.
        self.registry.broadcast_raw(raw, None).await;
    }

    async fn apply_quiz_id(&self, envelope: &UpstreamEnvelope) {
        let Some(quiz_id) = envelope.content_string() else {
            warn!("live_quiz_id event without a usable content field");
            return;
        };
        if let Err(store_error) = self.store.set_quiz_id(&quiz_id).await {
            warn!(%store_error, quiz_id, "failed to persist quiz id");
        }
    }

    async fn apply_question_number(&self, envelope: &UpstreamEnvelope) {
        let Some(number) = envelope.content_i64() else {
            warn!("live_question_number event without a numeric content field");
            return;
        };
        if let Err(store_error) = self.store.set_question_number(number).await {
            warn!(%store_error, number, "failed to persist question number");
        }
    }

    async fn apply_question_retrieved(&self, envelope: &UpstreamEnvelope) {
        let (Some(user), Some(number)) = (envelope.user_name.as_deref(), envelope.content_i64())
        else {
            warn!("live_question_retrieved event missing userName or numeric content");
            return;
        };
        match self
            .store
            .update_user_field(user, UserField::QuestionNumber(number))
            .await
        {
            Ok(UpdateOutcome::Applied) => {}
            Ok(UpdateOutcome::NotFound) => {
                warn!(user, "question update for unknown user");
            }
            Err(store_error) => {
                warn!(%store_error, user, "failed to persist question update");
            }
        }
    }

    /// Scores accumulate server-side: read the current total, add the
    /// delta, write the sum back. The delta payload is what gets forwarded.
    async fn apply_score_delta(&self, envelope: &UpstreamEnvelope) {
        let (Some(user), Some(delta)) = (envelope.user_name.as_deref(), envelope.content_i64())
        else {
            warn!("live_score event missing userName or numeric content");
            return;
        };
        let current = match self.store.get_user(user).await {
            Ok(Some(record)) => record.score_or_default(),
            Ok(None) => {
                warn!(user, "score delta for unknown user");
                return;
            }
            Err(store_error) => {
                warn!(%store_error, user, "failed to read score, skipping accumulation");
                return;
            }
        };
        let total = current + delta;
        match self
            .store
            .update_user_field(user, UserField::TotalScore(total))
            .await
        {
            Ok(UpdateOutcome::Applied) => {
                debug!(user, delta, total, "score accumulated");
            }
            Ok(UpdateOutcome::NotFound) => {
                warn!(user, "score update raced with record removal");
            }
            Err(store_error) => {
                warn!(%store_error, user, "failed to persist accumulated score");
            }
        }
    }
}

fn kind_label(kind: UpstreamKind) -> &'static str {
    match kind {
        UpstreamKind::LiveQuizId => "live_quiz_id",
        UpstreamKind::LiveQuestionNumber => "live_question_number",
        UpstreamKind::LiveQuestionRetrieved => "live_question_retrieved",
        UpstreamKind::LiveScore => "live_score",
        UpstreamKind::Unknown => "unknown",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use pulse_core::ids::ConnectionId;
    use pulse_core::state::UserRecord;
    use pulse_store::MemoryQuizStore;

    use crate::websocket::connection::ClientConnection;

    struct Fixture {
        normalizer: UpstreamNormalizer,
        registry: Arc<SessionRegistry>,
        store: Arc<MemoryQuizStore>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let store = Arc::new(MemoryQuizStore::new());
        Fixture {
            normalizer: UpstreamNormalizer::new(Arc::clone(&registry), store.clone()),
            registry,
            store,
        }
    }

    async fn join(
        registry: &SessionRegistry,
        user: &str,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(ConnectionId::new(), user.into(), tx));
        registry.add(Arc::clone(&conn)).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn quiz_id_event_mutates_then_forwards() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;

        let raw = r#"{"messageType":"live_quiz_id","content":"quiz-42"}"#;
        fx.normalizer.handle(raw).await;

        assert_eq!(fx.store.get_quiz_id().await.unwrap().as_deref(), Some("quiz-42"));
        assert_eq!(rx.try_recv().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn question_number_event_mutates_then_forwards() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;

        let raw = r#"{"messageType":"live_question_number","content":4}"#;
        fx.normalizer.handle(raw).await;

        assert_eq!(fx.store.get_question_number().await.unwrap(), Some(4));
        assert_eq!(rx.try_recv().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn question_retrieved_updates_one_user() {
        let fx = fixture();
        fx.store.put_user(&UserRecord::new("student1")).await.unwrap();

        fx.normalizer
            .handle(
                r#"{"messageType":"live_question_retrieved","userName":"student1","content":2}"#,
            )
            .await;

        let record = fx.store.get_user("student1").await.unwrap().unwrap();
        assert_eq!(record.live_question_number, 2);
    }

    #[tokio::test]
    async fn first_score_delta_lands_on_zero_not_sentinel() {
        let fx = fixture();
        // Fresh record: score is "not yet set".
        fx.store.put_user(&UserRecord::new("student1")).await.unwrap();

        fx.normalizer
            .handle(r#"{"messageType":"live_score","userName":"student1","content":5}"#)
            .await;

        let record = fx.store.get_user("student1").await.unwrap().unwrap();
        assert_eq!(record.live_total_score, Some(5));
    }

    #[tokio::test]
    async fn score_deltas_accumulate() {
        let fx = fixture();
        fx.store.put_user(&UserRecord::new("student1")).await.unwrap();

        for delta in [5, 3, -2] {
            fx.normalizer
                .handle(&format!(
                    r#"{{"messageType":"live_score","userName":"student1","content":{delta}}}"#
                ))
                .await;
        }

        let record = fx.store.get_user("student1").await.unwrap().unwrap();
        assert_eq!(record.live_total_score, Some(6));
    }

    #[tokio::test]
    async fn score_event_is_forwarded_after_the_write() {
        let fx = fixture();
        fx.store.put_user(&UserRecord::new("student1")).await.unwrap();
        let (_conn, mut rx) = join(&fx.registry, "teacher").await;

        let raw = r#"{"messageType":"live_score","userName":"student1","content":5}"#;
        fx.normalizer.handle(raw).await;

        // By the time the broadcast is observable, the store already holds
        // the accumulated value.
        assert_eq!(rx.try_recv().unwrap().as_str(), raw);
        let record = fx.store.get_user("student1").await.unwrap().unwrap();
        assert_eq!(record.live_total_score, Some(5));
    }

    #[tokio::test]
    async fn unknown_event_is_forwarded_verbatim() {
        let fx = fixture();
        let (_c1, mut rx1) = join(&fx.registry, "a").await;
        let (_c2, mut rx2) = join(&fx.registry, "b").await;

        let raw = r#"{"messageType":"confetti_burst","content":{"pieces":9000}}"#;
        fx.normalizer.handle(raw).await;

        assert_eq!(rx1.try_recv().unwrap().as_str(), raw);
        assert_eq!(rx2.try_recv().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_not_forwarded() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;

        fx.normalizer.handle("not json at all").await;
        fx.normalizer.handle(r#"{"content":"no type"}"#).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn score_for_unknown_user_still_forwards() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;

        let raw = r#"{"messageType":"live_score","userName":"ghost","content":5}"#;
        fx.normalizer.handle(raw).await;

        // No record was created...
        assert_eq!(fx.store.get_user("ghost").await.unwrap(), None);
        // ...but the event still reached the clients.
        assert_eq!(rx.try_recv().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn recognized_event_with_bad_fields_still_forwards() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;

        let raw = r#"{"messageType":"live_question_number","content":"not a number"}"#;
        fx.normalizer.handle(raw).await;

        assert_eq!(fx.store.get_question_number().await.unwrap(), None);
        assert_eq!(rx.try_recv().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn run_drains_a_stream_end_to_end() {
        let fx = fixture();
        let (_conn, mut rx) = join(&fx.registry, "a").await;
        let store = fx.store.clone();

        let events = store.subscribe("notifications").await.unwrap();
        let task = tokio::spawn(fx.normalizer.run(events));

        let raw = r#"{"messageType":"live_quiz_id","content":"quiz-1"}"#;
        assert_eq!(store.publish("notifications", raw), 1);

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.as_str(), raw);
        assert_eq!(store.get_quiz_id().await.unwrap().as_deref(), Some("quiz-1"));

        task.abort();
    }

    #[test]
    fn kind_labels_are_wire_names() {
        assert_eq!(kind_label(UpstreamKind::LiveScore), "live_score");
        assert_eq!(kind_label(UpstreamKind::Unknown), "unknown");
    }
}
