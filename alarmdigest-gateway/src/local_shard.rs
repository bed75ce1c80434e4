use std::collections::HashMap;

use alarmdigest_model::{Alarm, AlarmDigest, AlarmStatusChanged, SendAlarmDigest, Status, UserID};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::DigestPublisher;

/// The two message kinds a [`LocalShard`] multiplexes on its single inbox.
///
/// Modeling the inbox as a tagged enum (rather than two separate channels)
/// is what lets a single `recv` preserve the arrival order between updates
/// and digest requests for the same user: a digest request always sees
/// exactly the updates that were enqueued ahead of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardEvent {
    Update(AlarmStatusChanged),
    DigestRequest(SendAlarmDigest),
}

impl From<AlarmStatusChanged> for ShardEvent {
    fn from(value: AlarmStatusChanged) -> Self {
        ShardEvent::Update(value)
    }
}

impl From<SendAlarmDigest> for ShardEvent {
    fn from(value: SendAlarmDigest) -> Self {
        ShardEvent::DigestRequest(value)
    }
}

/// Default inbox capacity for a local shard, matching the upstream prototype.
pub const INBOX_CAPACITY: usize = 100;

/// Per-(user, alarm) state owned exclusively by one [`LocalShard`].
#[derive(Clone, Debug, PartialEq, Eq)]
struct AlarmState {
    status: Status,
    latest_changed_at: DateTime<Utc>,
    /// Armed by an active-status transition, disarmed by a digest or by
    /// going `CLEARED`.
    to_send: bool,
}

impl Default for AlarmState {
    fn default() -> Self {
        Self {
            status: Status::Cleared,
            latest_changed_at: DateTime::<Utc>::default(),
            to_send: false,
        }
    }
}

/// A single-threaded worker owning the alarm state of a subset of users.
///
/// Users are assigned to a `LocalShard` by the [`Dispatcher`][crate::bus::Dispatcher]
/// before anything ever reaches here; a `LocalShard` never second-guesses
/// that assignment.
pub struct LocalShard {
    index: u64,
    users: HashMap<UserID, HashMap<alarmdigest_model::AlarmID, AlarmState>>,
}

impl LocalShard {
    /// Creates an empty local shard with the given index (used only for
    /// logging).
    pub fn new(index: u64) -> Self {
        Self {
            index,
            users: HashMap::new(),
        }
    }

    /// Runs the event loop until `token` is cancelled or the inbox closes.
    ///
    /// Returns `Ok(())` in both cases; a non-fatal termination. The only way
    /// this returns `Err` is if a digest publish fails, which propagates as a
    /// panic instead (see [`Self::handle_digest_request`]), so in practice
    /// this never returns `Err`. It stays fallible so the supervisor can keep
    /// treating every spawned task uniformly.
    pub async fn run<P>(
        mut self,
        mut inbox: mpsc::Receiver<ShardEvent>,
        publish: P,
        token: CancellationToken,
    ) -> Result<(), crate::Error>
    where
        P: DigestPublisher,
    {
        tracing::info!(local_shard = self.index, "local shard started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(local_shard = self.index, "local shard shutting down");
                    return Ok(());
                }
                event = inbox.recv() => {
                    match event {
                        None => return Ok(()),
                        Some(ShardEvent::Update(update)) => self.handle_status_changed(update),
                        Some(ShardEvent::DigestRequest(request)) => {
                            self.handle_digest_request(request, &publish).await;
                        }
                    }
                }
            }
        }
    }

    /// Folds one `AlarmStatusChanged` update into the owning alarm's state.
    fn handle_status_changed(&mut self, update: AlarmStatusChanged) {
        let alarms = self.users.entry(update.user_id.clone()).or_default();
        let state = alarms.entry(update.alarm_id.clone()).or_default();

        if state.latest_changed_at > update.changed_at {
            tracing::info!(
                local_shard = self.index,
                user_id = %update.user_id,
                alarm_id = %update.alarm_id,
                "update ignored because a newer one exists"
            );
            return;
        }
        state.latest_changed_at = update.changed_at;

        if state.status != update.status {
            state.status = update.status;
            state.to_send = update.status.is_active();
        }
        // Status unchanged: `to_send` is left exactly as it was, whatever
        // its value — a repeated active status never re-arms an alarm that
        // already had its digest sent.
    }

    /// Gathers and publishes the armed alarms of one user.
    async fn handle_digest_request<P>(&mut self, request: SendAlarmDigest, publish: &P)
    where
        P: DigestPublisher,
    {
        let Some(alarms) = self.users.get_mut(&request.user_id) else {
            tracing::debug!(
                local_shard = self.index,
                user_id = %request.user_id,
                "no alarms for user, nothing to send"
            );
            return;
        };

        let mut active_alarms = Vec::new();
        let mut just_sent = Vec::new();
        for (alarm_id, state) in alarms.iter() {
            if state.to_send {
                active_alarms.push(Alarm {
                    alarm_id: alarm_id.clone(),
                    status: state.status,
                    latest_changed_at: state.latest_changed_at,
                });
                just_sent.push(alarm_id.clone());
            }
        }

        if active_alarms.is_empty() {
            return;
        }

        active_alarms.sort_by_key(|alarm| alarm.latest_changed_at);

        let digest = AlarmDigest {
            user_id: request.user_id.clone(),
            active_alarms,
        };

        publish
            .publish(digest.clone())
            .await
            .unwrap_or_else(|err| panic!("publishing alarm digest failed: {err}"));

        for alarm_id in just_sent {
            if let Some(state) = alarms.get_mut(&alarm_id) {
                state.to_send = false;
            }
        }

        tracing::info!(
            local_shard = self.index,
            user_id = %digest.user_id,
            alarm_count = digest.active_alarms.len(),
            "alarm digest sent"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use alarmdigest_model::AlarmID;
    use chrono::TimeZone;
    use futures_util::FutureExt;
    use std::panic::AssertUnwindSafe;
    use std::sync::Mutex;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn update(user: &str, alarm: &str, status: Status, at: i64) -> AlarmStatusChanged {
        AlarmStatusChanged {
            user_id: UserID::from(user),
            alarm_id: AlarmID::from(alarm),
            status,
            changed_at: t(at),
        }
    }

    /// A [`DigestPublisher`] that records every digest it's handed instead of
    /// reaching a broker, so the production `handle_digest_request`/`run`
    /// path can be driven directly in tests. Can be told to fail the next
    /// publish to exercise the "clear `to_send` only after a successful
    /// publish" rule.
    #[derive(Default)]
    struct StubPublisher {
        published: Mutex<Vec<AlarmDigest>>,
        fail_next: Mutex<bool>,
    }

    impl StubPublisher {
        fn fail_next_publish(&self) {
            *self.fail_next.lock().unwrap() = true;
        }

        fn sent(&self) -> Vec<AlarmDigest> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DigestPublisher for StubPublisher {
        async fn publish(&self, digest: AlarmDigest) -> Result<(), PublishError> {
            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(PublishError::BusShutDown);
            }
            self.published.lock().unwrap().push(digest);
            Ok(())
        }
    }

    /// Drives a `LocalShard` against its real handlers and a [`StubPublisher`],
    /// so every assertion below exercises the production digest-emission
    /// path rather than a reimplementation of it.
    struct Harness {
        shard: LocalShard,
        publisher: StubPublisher,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                shard: LocalShard::new(0),
                publisher: StubPublisher::default(),
            }
        }

        fn change(&mut self, user: &str, alarm: &str, status: Status, at: i64) {
            self.shard.handle_status_changed(update(user, alarm, status, at));
        }

        /// Runs a real `SendAlarmDigest` through `handle_digest_request` and
        /// returns the alarms of whatever digest was just published, if any.
        async fn send(&mut self, user: &str) -> Option<Vec<Alarm>> {
            let before = self.publisher.sent().len();
            self.shard
                .handle_digest_request(SendAlarmDigest { user_id: UserID::from(user) }, &self.publisher)
                .await;
            self.publisher.sent().get(before).map(|digest| digest.active_alarms.clone())
        }
    }

    #[tokio::test]
    async fn s1_single_critical_then_send() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Critical, 1);
        let digest = h.send("u1").await.unwrap();
        assert_eq!(digest, vec![Alarm { alarm_id: AlarmID::from("a1"), status: Status::Critical, latest_changed_at: t(1) }]);
    }

    #[tokio::test]
    async fn s2_out_of_order_update_is_dropped() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Critical, 2);
        h.change("u1", "a1", Status::Warning, 1);
        let digest = h.send("u1").await.unwrap();
        assert_eq!(digest, vec![Alarm { alarm_id: AlarmID::from("a1"), status: Status::Critical, latest_changed_at: t(2) }]);
    }

    #[tokio::test]
    async fn s3_cleared_alarm_produces_no_digest() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Critical, 1);
        h.change("u1", "a1", Status::Cleared, 2);
        assert!(h.send("u1").await.is_none());
    }

    #[tokio::test]
    async fn s4_second_send_without_change_emits_nothing() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Critical, 1);
        let first = h.send("u1").await.unwrap();
        assert_eq!(first.len(), 1);

        h.change("u1", "a1", Status::Critical, 2);
        assert!(h.send("u1").await.is_none());
    }

    #[tokio::test]
    async fn s5_digest_sorted_by_latest_changed_at() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Warning, 2);
        h.change("u1", "a2", Status::Critical, 1);
        let digest = h.send("u1").await.unwrap();
        assert_eq!(
            digest,
            vec![
                Alarm { alarm_id: AlarmID::from("a2"), status: Status::Critical, latest_changed_at: t(1) },
                Alarm { alarm_id: AlarmID::from("a1"), status: Status::Warning, latest_changed_at: t(2) },
            ]
        );
    }

    #[tokio::test]
    async fn s6_two_digests_across_a_sequence() {
        let mut h = Harness::new();
        h.change("u2", "a1", Status::Warning, 1);
        h.change("u2", "a1", Status::Cleared, 2);
        h.change("u2", "a1", Status::Critical, 4);
        h.change("u2", "a1", Status::Warning, 3); // older than Latest=4, dropped
        h.change("u2", "a2", Status::Critical, 2);

        let first = h.send("u2").await.unwrap();
        assert_eq!(
            first,
            vec![
                Alarm { alarm_id: AlarmID::from("a2"), status: Status::Critical, latest_changed_at: t(2) },
                Alarm { alarm_id: AlarmID::from("a1"), status: Status::Critical, latest_changed_at: t(4) },
            ]
        );

        h.change("u2", "a2", Status::Warning, 3);
        let second = h.send("u2").await.unwrap();
        assert_eq!(
            second,
            vec![Alarm { alarm_id: AlarmID::from("a2"), status: Status::Warning, latest_changed_at: t(3) }]
        );
    }

    #[tokio::test]
    async fn unknown_user_produces_no_digest() {
        let mut h = Harness::new();
        assert!(h.send("nobody").await.is_none());
    }

    #[tokio::test]
    async fn equal_timestamp_replay_is_accepted() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Warning, 5);
        // Same instant, different status: accepted since t == Latest.
        h.change("u1", "a1", Status::Critical, 5);
        let digest = h.send("u1").await.unwrap();
        assert_eq!(digest[0].status, Status::Critical);
    }

    #[tokio::test]
    async fn failed_publish_panics_without_clearing_to_send() {
        let mut h = Harness::new();
        h.change("u1", "a1", Status::Critical, 1);
        h.publisher.fail_next_publish();

        // A failed publish is fatal per the process's error-handling policy,
        // so `handle_digest_request` panics rather than returning an error.
        // Catching that unwind lets this test then check that the panic
        // happened *before* `to_send` was cleared.
        let result = AssertUnwindSafe(h.send("u1")).catch_unwind().await;
        assert!(result.is_err(), "a failed publish must panic");

        let digest = h.send("u1").await.unwrap();
        assert_eq!(digest, vec![Alarm { alarm_id: AlarmID::from("a1"), status: Status::Critical, latest_changed_at: t(1) }]);
    }

    #[tokio::test]
    async fn run_processes_an_update_then_a_digest_request_in_arrival_order() {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let publisher = std::sync::Arc::new(StubPublisher::default());
        let token = CancellationToken::new();

        let run_publisher = std::sync::Arc::clone(&publisher);
        let handle = tokio::spawn(LocalShard::new(0).run(rx, run_publisher, token));

        tx.send(update("u1", "a1", Status::Critical, 1).into()).await.unwrap();
        tx.send(ShardEvent::DigestRequest(SendAlarmDigest { user_id: UserID::from("u1") })).await.unwrap();
        // Closing the inbox after both sends lets `run` drain exactly these
        // two messages, in order, then return on its own once `recv` yields
        // `None` — no need to race a cancellation against task scheduling.
        drop(tx);

        handle.await.unwrap().unwrap();

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, UserID::from("u1"));
        assert_eq!(sent[0].active_alarms[0].alarm_id, AlarmID::from("a1"));
    }
}
