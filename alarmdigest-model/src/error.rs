use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

/// Why an incoming entity failed [`Entity::validate`].
///
/// [`Entity::validate`]: crate::Entity::validate
#[derive(Debug)]
pub enum ValidationError {
    /// A required string field was empty.
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A required instant field was the zero/default instant.
    ZeroTimestamp {
        /// Name of the offending field.
        field: &'static str,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField { field } => write!(f, "field `{field}` must not be empty"),
            Self::ZeroTimestamp { field } => write!(f, "field `{field}` must not be the zero instant"),
        }
    }
}

impl StdError for ValidationError {}
