//! The bus connection, dispatcher, local-shard state machine and supervisor
//! that together route alarm-status updates to the worker that owns them and
//! publish digests back out.
//!
//! See [`AppSupervisor`] for the entry point a binary should use.

mod bus;
mod config;
mod error;
mod local_shard;
mod supervisor;

pub use bus::{BusConnection, DigestPublisher, Dispatcher, PublishHandle};
pub use config::{Config, ConfigError};
pub use error::{Error, PublishError};
pub use local_shard::{LocalShard, ShardEvent, INBOX_CAPACITY};
pub use supervisor::AppSupervisor;

pub use tokio_util::sync::CancellationToken;
