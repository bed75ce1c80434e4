//! Wire entities carried over the alarm-digest bus.
//!
//! Every message that flows through the [`Dispatcher`] implements [`Entity`],
//! which exposes the bytes used to compute its shard assignment and a
//! self-validation check. Every message carried over the bus, ingress or
//! egress, implements [`Subject`], which names the topic it travels on.
//!
//! [`Dispatcher`]: https://docs.rs/alarmdigest-gateway

mod error;
mod events;
mod ids;
mod status;

pub use error::ValidationError;
pub use events::{Alarm, AlarmDigest, AlarmStatusChanged, SendAlarmDigest};
pub use ids::{AlarmID, UserID};
pub use status::Status;

/// Associates a wire entity with the bus subject (topic) it is carried on.
///
/// The subject is always the entity's unqualified type name, matching the
/// convention used by the broker this service talks to.
pub trait Subject {
    /// The subject this entity's values are published or subscribed under.
    const SUBJECT: &'static str;
}

/// A wire entity that can be sharded and self-validated.
///
/// Only ingress entities ([`AlarmStatusChanged`], [`SendAlarmDigest`])
/// implement this; [`AlarmDigest`] is egress-only and is never subject to
/// dispatch-time sharding or validation.
pub trait Entity: Subject {
    /// Returns the bytes fed to the shard-ID generator.
    ///
    /// All user-addressed messages shard on the same bytes (the `UserID`),
    /// which keeps every message about a given user on the same node and
    /// local shard.
    fn shard_seed(&self) -> &[u8];

    /// Checks that required fields are present and well-formed.
    ///
    /// Returns `Err` if the message should be logged and dropped rather than
    /// routed to a local shard.
    fn validate(&self) -> Result<(), ValidationError>;
}
