use std::marker::PhantomData;
use std::sync::Arc;

use alarmdigest_model::{Entity, Subject};
use serde::de::DeserializeOwned;

use crate::config::Config;

/// Decodes, validates and shards one raw message frame for a single subject.
///
/// A `Dispatcher<T>` is created once per subscription and reused across every
/// frame received on that subject. It owns no per-message state: each call to
/// [`dispatch`][Self::dispatch] is independent, which is what lets the
/// subscription loop hand decoded values straight to a local shard without
/// worrying about races between successive frames.
pub struct Dispatcher<T> {
    config: Arc<Config>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Dispatcher<T>
where
    T: Entity + DeserializeOwned,
{
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            _entity: PhantomData,
        }
    }

    /// Decodes `payload`, validates it, and computes which local shard on
    /// this node owns it.
    ///
    /// Returns `None` when the message should be dropped: it failed to
    /// decode, failed validation, or belongs to a different node. Every drop
    /// is logged at the appropriate level before returning.
    pub fn dispatch(&self, payload: &[u8]) -> Option<(usize, T)> {
        let value: T = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(subject = T::SUBJECT, %err, "decoding message failed");
                return None;
            }
        };

        if let Err(err) = value.validate() {
            tracing::error!(subject = T::SUBJECT, %err, "received entity is in invalid state");
            return None;
        }

        let shards = alarmdigest_sharding::generate(
            value.shard_seed(),
            &[self.config.num_of_shards, self.config.num_of_local_shards],
        );
        let (node_shard, local_shard) = (shards[0], shards[1]);

        if node_shard != self.config.shard_id {
            tracing::debug!(
                subject = T::SUBJECT,
                dst_shard_id = node_shard,
                shard_id = self.config.shard_id,
                "entity not for this shard, ignoring"
            );
            return None;
        }

        Some((local_shard as usize, value))
    }
}
