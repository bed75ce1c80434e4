use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

/// Process-wide, immutable configuration.
///
/// Built once (by the binary's CLI parsing) and threaded by shared reference
/// to every collaborator that needs it. Nothing in this crate mutates a
/// `Config` after construction.
#[derive(Clone, Debug)]
pub struct Config {
    /// This node's index in `[0, num_of_shards)`.
    pub shard_id: u64,
    /// Total number of shards (nodes) in the cluster.
    pub num_of_shards: u64,
    /// Number of in-process local-shard workers on this node.
    pub num_of_local_shards: u64,
    /// Addresses of the broker cluster, tried in order with failover.
    pub nats_addresses: Vec<String>,
    /// Turns on debug-level logging.
    pub verbose: bool,
}

impl Config {
    /// Builds a [`Config`], checking the one cross-field invariant that
    /// matters at startup: this node's shard ID must fall inside the
    /// cluster's shard count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ShardIdOutOfRange`] if `shard_id >=
    /// num_of_shards`.
    pub fn new(
        shard_id: u64,
        num_of_shards: u64,
        num_of_local_shards: u64,
        nats_addresses: Vec<String>,
        verbose: bool,
    ) -> Result<Self, ConfigError> {
        if shard_id >= num_of_shards {
            return Err(ConfigError::ShardIdOutOfRange {
                shard_id,
                num_of_shards,
            });
        }
        if num_of_local_shards == 0 {
            return Err(ConfigError::NoLocalShards);
        }

        Ok(Self {
            shard_id,
            num_of_shards,
            num_of_local_shards,
            nats_addresses,
            verbose,
        })
    }
}

/// Why building a [`Config`] failed.
#[derive(Debug)]
pub enum ConfigError {
    /// `shard_id` was not less than `num_of_shards`.
    ShardIdOutOfRange { shard_id: u64, num_of_shards: u64 },
    /// `num_of_local_shards` was zero; no worker could ever own a user.
    NoLocalShards,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShardIdOutOfRange {
                shard_id,
                num_of_shards,
            } => write!(
                f,
                "shard id {shard_id} must be less than the number of shards ({num_of_shards})"
            ),
            Self::NoLocalShards => f.write_str("local-shards must be at least 1"),
        }
    }
}

impl StdError for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shard_id_equal_to_num_of_shards() {
        let err = Config::new(4, 4, 1, vec![], false).unwrap_err();
        assert!(matches!(err, ConfigError::ShardIdOutOfRange { .. }));
    }

    #[test]
    fn rejects_zero_local_shards() {
        let err = Config::new(0, 1, 0, vec![], false).unwrap_err();
        assert!(matches!(err, ConfigError::NoLocalShards));
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = Config::new(0, 4, 8, vec!["nats://localhost:4222".into()], true).unwrap();
        assert_eq!(config.shard_id, 0);
        assert_eq!(config.num_of_local_shards, 8);
    }
}
