use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

/// Control-plane errors: every one of these is fatal to the [`AppSupervisor`]
/// and propagates as the process's terminal result.
///
/// Data-plane errors (decode failures, validation failures, wrong-shard
/// messages, unknown inbox message kinds) never reach this type — they are
/// logged and recovered locally at the point they occur.
///
/// [`AppSupervisor`]: crate::supervisor::AppSupervisor
#[derive(Debug)]
pub enum Error {
    /// A second subscription was attempted on a subject already subscribed.
    SubscribeConflict { subject: &'static str },
    /// Registering a subscription with the broker failed.
    Subscribe { source: async_nats::SubscribeError },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscribeConflict { subject } => {
                write!(f, "duplicate subscription on subject `{subject}`")
            }
            Self::Subscribe { .. } => f.write_str("registering subscription with the broker failed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Subscribe { source } => Some(source),
            Self::SubscribeConflict { .. } => None,
        }
    }
}

/// A catastrophic, unrecoverable failure publishing a digest.
///
/// Per design, the broker client's `publish` only fails when the local
/// client is broken (out of memory, disconnected for good, etc). There is no
/// sane local recovery, so callers are expected to let this crash the
/// process; a supervising process manager is expected to restart it.
#[derive(Debug)]
pub enum PublishError {
    /// The broker client rejected the publish.
    Send(async_nats::PublishError),
    /// The bus connection shut down before a client ever became available.
    BusShutDown,
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(source) => write!(f, "publishing digest failed: {source}"),
            Self::BusShutDown => f.write_str("bus connection shut down before publish completed"),
        }
    }
}

impl StdError for PublishError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Send(source) => Some(source),
            Self::BusShutDown => None,
        }
    }
}
