//! Connection, subscription and publication against the subject-based
//! broker, with retrying connect and graceful shutdown.

mod dispatch;

pub use dispatch::Dispatcher;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alarmdigest_model::{AlarmDigest, Entity, Subject};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, PublishError};
use crate::local_shard::ShardEvent;

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
const PING_INTERVAL: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single connection to the broker cluster, shared by every subscription
/// and every publisher in the process.
///
/// Readiness is modeled with a [`watch`] channel carrying the connected
/// [`async_nats::Client`] once [`run`][Self::run] has connected; every other
/// method waits on that channel before doing anything, which is the
/// `awaits readiness` behavior described in the design.
pub struct BusConnection {
    addresses: Vec<String>,
    ready_tx: watch::Sender<Option<async_nats::Client>>,
    ready_rx: watch::Receiver<Option<async_nats::Client>>,
    subscriptions: Mutex<HashSet<&'static str>>,
}

impl BusConnection {
    /// Creates a not-yet-connected bus connection over the given broker
    /// addresses, tried in order with failover.
    pub fn new(addresses: Vec<String>) -> Self {
        let (ready_tx, ready_rx) = watch::channel(None);
        Self {
            addresses,
            ready_tx,
            ready_rx,
            subscriptions: Mutex::new(HashSet::new()),
        }
    }

    /// Returns a cloneable capability for publishing [`AlarmDigest`] values,
    /// independent of whether the connection is up yet.
    pub fn publish_handle(&self) -> PublishHandle {
        PublishHandle {
            ready: self.ready_rx.clone(),
        }
    }

    /// Connects with a fixed retry delay until success or cancellation, then
    /// waits for `token` to be cancelled before returning.
    ///
    /// No-echo, a 10s ping interval and a 10s connect timeout are applied, as
    /// is failover across every configured address. Reconnection after the
    /// initial connect is handled by the broker client itself; this task's
    /// job is only the initial handshake and holding the connection open
    /// until shutdown.
    pub async fn run(&self, token: CancellationToken) -> Result<(), Error> {
        tracing::info!(servers = ?self.addresses, "connecting to broker");

        let connect_options = || {
            async_nats::ConnectOptions::new()
                .name("alarm-digest")
                .no_echo()
                .ping_interval(PING_INTERVAL)
                .connection_timeout(CONNECT_TIMEOUT)
        };

        let client = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("cancelled before broker connection was established");
                    return Ok(());
                }
                // `self.addresses` (a `Vec<String>`) implements `ToServerAddrs`
                // as one address per entry; joining them into a single
                // comma-separated string would instead parse as one bogus
                // address and break multi-address failover.
                result = async_nats::connect_with_options(self.addresses.clone(), connect_options()) => {
                    match result {
                        Ok(client) => break client,
                        Err(err) => {
                            tracing::warn!(%err, "connecting to broker failed, retrying");
                            tokio::select! {
                                _ = token.cancelled() => return Ok(()),
                                _ = tokio::time::sleep(CONNECT_RETRY_DELAY) => {}
                            }
                        }
                    }
                }
            }
        };

        tracing::info!("connected to broker");
        // Ignore the send failure: it only happens if every receiver (every
        // subscriber/publisher handle) has already been dropped, which means
        // there's nothing left to notify.
        let _ = self.ready_tx.send(Some(client));

        token.cancelled().await;
        tracing::info!("terminating broker connection");
        Ok(())
    }

    /// Awaits readiness, then registers exactly one subscription for `T`'s
    /// subject, routing each decoded value into `recv_chs[local_shard]` until
    /// `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubscribeConflict`] if this subject is already
    /// subscribed, or [`Error::Subscribe`] if the broker rejects the
    /// subscription request.
    pub async fn subscribe<T>(
        &self,
        token: CancellationToken,
        config: Arc<Config>,
        recv_chs: Arc<Vec<mpsc::Sender<ShardEvent>>>,
    ) -> Result<(), Error>
    where
        T: Entity + DeserializeOwned + Into<ShardEvent> + Send + 'static,
    {
        let client = self.wait_ready(&token).await;
        let Some(client) = client else {
            return Ok(());
        };

        {
            let mut subscriptions = self.subscriptions.lock().await;
            if !subscriptions.insert(T::SUBJECT) {
                return Err(Error::SubscribeConflict {
                    subject: T::SUBJECT,
                });
            }
        }

        tracing::info!(subject = T::SUBJECT, "subscribing to subject");
        let mut subscriber = client
            .subscribe(T::SUBJECT)
            .await
            .map_err(|source| Error::Subscribe { source })?;
        tracing::info!(subject = T::SUBJECT, "subscribed to subject");

        let dispatcher = Dispatcher::<T>::new(config);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = subscriber.next() => {
                    let Some(message) = message else { break };
                    if let Some((local_shard, value)) = dispatcher.dispatch(&message.payload) {
                        let event: ShardEvent = value.into();
                        // Blocks under backpressure by design: a slow local
                        // shard must throttle the whole subscription rather
                        // than have messages silently dropped.
                        if recv_chs[local_shard].send(event).await.is_err() {
                            tracing::warn!(subject = T::SUBJECT, local_shard, "local shard inbox closed, dropping message");
                        }
                    }
                }
            }
        }

        tracing::info!(subject = T::SUBJECT, "subscription draining");
        Ok(())
    }

    async fn wait_ready(&self, token: &CancellationToken) -> Option<async_nats::Client> {
        let mut ready = self.ready_rx.clone();
        tokio::select! {
            _ = token.cancelled() => None,
            result = ready.wait_for(|client| client.is_some()) => {
                result.ok().and_then(|client| client.clone())
            }
        }
    }
}

/// A cloneable capability for publishing [`AlarmDigest`] values, independent
/// of any particular [`BusConnection`] instance's lifetime.
#[derive(Clone)]
pub struct PublishHandle {
    ready: watch::Receiver<Option<async_nats::Client>>,
}

impl PublishHandle {
    /// Awaits readiness, encodes `digest`, and hands it to the broker
    /// client's local outbound buffer.
    ///
    /// A returned error means the broker client itself is broken; per
    /// design, callers treat this as fatal (see [`LocalShard`][crate::local_shard::LocalShard]).
    pub async fn publish(&self, digest: AlarmDigest) -> Result<(), PublishError> {
        let mut ready = self.ready.clone();
        if ready.wait_for(|client| client.is_some()).await.is_err() {
            return Err(PublishError::BusShutDown);
        }
        let client = ready
            .borrow()
            .clone()
            .expect("wait_for only resolves once a client is present");

        let payload = serde_json::to_vec(&digest).expect("AlarmDigest always encodes to JSON");
        client
            .publish(AlarmDigest::SUBJECT, payload.into())
            .await
            .map_err(PublishError::Send)
    }
}

/// The publishing capability a [`LocalShard`][crate::local_shard::LocalShard]
/// needs, pulled out as a trait so the digest-emission path can be driven in
/// tests against a stub instead of a live broker connection.
#[async_trait::async_trait]
pub trait DigestPublisher: Send + Sync {
    /// Publishes `digest`, as [`PublishHandle::publish`].
    async fn publish(&self, digest: AlarmDigest) -> Result<(), PublishError>;
}

#[async_trait::async_trait]
impl DigestPublisher for PublishHandle {
    async fn publish(&self, digest: AlarmDigest) -> Result<(), PublishError> {
        PublishHandle::publish(self, digest).await
    }
}

#[async_trait::async_trait]
impl<T> DigestPublisher for Arc<T>
where
    T: DigestPublisher + ?Sized,
{
    async fn publish(&self, digest: AlarmDigest) -> Result<(), PublishError> {
        T::publish(self, digest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarmdigest_model::{AlarmDigest, UserID};

    /// Exercises `publish`'s readiness wait without a live broker: dropping
    /// the `BusConnection` closes the watch channel that `ready` waits on,
    /// which is exactly what happens if `run` exits before ever connecting.
    #[tokio::test]
    async fn publish_errors_once_the_bus_shuts_down_before_ready() {
        let bus = BusConnection::new(vec!["nats://localhost:4222".into()]);
        let handle = bus.publish_handle();
        drop(bus);

        let digest = AlarmDigest {
            user_id: UserID::from("u1"),
            active_alarms: vec![],
        };
        let result = handle.publish(digest).await;
        assert!(matches!(result, Err(PublishError::BusShutDown)));
    }

    /// A `subscribe` call racing against an already-cancelled token must
    /// return `Ok(())` without ever needing a connected client, since
    /// `wait_ready` loses the `select!` race immediately.
    #[tokio::test]
    async fn subscribe_returns_immediately_when_already_cancelled() {
        let bus = BusConnection::new(vec!["nats://localhost:4222".into()]);
        let config = Arc::new(Config::new(0, 1, 1, vec![], false).unwrap());
        let senders: Arc<Vec<mpsc::Sender<ShardEvent>>> = Arc::new(Vec::new());
        let token = CancellationToken::new();
        token.cancel();

        let result = bus
            .subscribe::<alarmdigest_model::AlarmStatusChanged>(token, config, senders)
            .await;
        assert!(result.is_ok());
    }
}
