use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque, non-empty identifier of a user.
///
/// Wraps a `String` rather than exposing one directly so that the "must be
/// non-empty" invariant has a single place to be checked ([`validate`]
/// callers), and so that `UserID` and [`AlarmID`] can't be swapped at a call
/// site by accident.
///
/// [`validate`]: crate::Entity::validate
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserID(pub String);

/// Opaque, non-empty identifier of an alarm, scoped to a [`UserID`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmID(pub String);

macro_rules! impl_id {
    ($ty:ident) => {
        impl $ty {
            /// Returns the identifier as a byte slice, suitable as a sharding seed.
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }

            /// Returns `true` if the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

impl_id!(UserID);
impl_id!(AlarmID);
