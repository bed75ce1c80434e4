use std::sync::Arc;

use alarmdigest_model::{AlarmStatusChanged, SendAlarmDigest};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bus::BusConnection;
use crate::config::Config;
use crate::error::Error;
use crate::local_shard::{LocalShard, ShardEvent, INBOX_CAPACITY};

/// Spawns and supervises every cooperating task of the service: the bus
/// connection, the local shards, and the two subscriptions.
///
/// Failure of any spawned task cancels every sibling and the supervisor
/// returns the first error observed; clean cancellation (no task ever
/// errored) returns `Ok(())`.
pub struct AppSupervisor {
    config: Arc<Config>,
}

impl AppSupervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Runs the service until `token` is cancelled or a task fails.
    pub async fn run(&self, token: CancellationToken) -> Result<(), Error> {
        let bus = Arc::new(BusConnection::new(self.config.nats_addresses.clone()));
        let mut tasks = JoinSet::new();

        {
            let bus = Arc::clone(&bus);
            let token = token.clone();
            tasks.spawn(async move { bus.run(token).await });
        }

        let mut senders = Vec::with_capacity(self.config.num_of_local_shards as usize);
        for index in 0..self.config.num_of_local_shards {
            let (tx, rx) = mpsc::channel::<ShardEvent>(INBOX_CAPACITY);
            senders.push(tx);

            let publish = bus.publish_handle();
            let token = token.clone();
            tasks.spawn(async move { LocalShard::new(index).run(rx, publish, token).await });
        }
        let senders = Arc::new(senders);

        {
            let bus = Arc::clone(&bus);
            let config = Arc::clone(&self.config);
            let senders = Arc::clone(&senders);
            let token = token.clone();
            tasks.spawn(async move {
                bus.subscribe::<AlarmStatusChanged>(token, config, senders).await
            });
        }
        {
            let bus = Arc::clone(&bus);
            let config = Arc::clone(&self.config);
            let senders = Arc::clone(&senders);
            let token = token.clone();
            tasks.spawn(async move { bus.subscribe::<SendAlarmDigest>(token, config, senders).await });
        }

        let mut first_error = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(%err, "supervised task failed, cancelling siblings");
                    first_error.get_or_insert(err);
                    token.cancel();
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        std::panic::resume_unwind(join_err.into_panic());
                    }
                    // Otherwise the task was aborted externally; nothing to
                    // propagate beyond making sure siblings shut down too.
                    token.cancel();
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
