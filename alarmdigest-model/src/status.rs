use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// The status of a single alarm.
///
/// `Cleared` is the sentinel meaning "no alarm"; `Warning` and `Critical` are
/// the two active statuses. Ordering between the two active statuses carries
/// no meaning to this service — a transition between them still counts as an
/// "active transition" that arms the alarm for the next digest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "CLEARED")]
    Cleared,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Status {
    /// Returns `true` for [`Status::Warning`] and [`Status::Critical`].
    pub fn is_active(self) -> bool {
        !matches!(self, Status::Cleared)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Cleared => "CLEARED",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}
