use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{AlarmID, UserID};
use crate::status::Status;
use crate::{Entity, Subject};

/// An update to a single alarm's status for a single user.
///
/// This is the sole ingress message that mutates [`LocalShard`] state.
///
/// [`LocalShard`]: https://docs.rs/alarmdigest-gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmStatusChanged {
    #[serde(rename = "UserID")]
    pub user_id: UserID,
    #[serde(rename = "AlarmID")]
    pub alarm_id: AlarmID,
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "ChangedAt")]
    pub changed_at: DateTime<Utc>,
}

impl Subject for AlarmStatusChanged {
    const SUBJECT: &'static str = "AlarmStatusChanged";
}

impl Entity for AlarmStatusChanged {
    fn shard_seed(&self) -> &[u8] {
        self.user_id.as_bytes()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.is_empty() {
            return Err(ValidationError::EmptyField { field: "UserID" });
        }
        if self.alarm_id.is_empty() {
            return Err(ValidationError::EmptyField { field: "AlarmID" });
        }
        if self.changed_at == DateTime::<Utc>::default() {
            return Err(ValidationError::ZeroTimestamp { field: "ChangedAt" });
        }
        Ok(())
    }
}

/// A request to emit the current digest of armed alarms for a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAlarmDigest {
    #[serde(rename = "UserID")]
    pub user_id: UserID,
}

impl Subject for SendAlarmDigest {
    const SUBJECT: &'static str = "SendAlarmDigest";
}

impl Entity for SendAlarmDigest {
    fn shard_seed(&self) -> &[u8] {
        self.user_id.as_bytes()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.is_empty() {
            return Err(ValidationError::EmptyField { field: "UserID" });
        }
        Ok(())
    }
}

/// The state of a single alarm as reported in an [`AlarmDigest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(rename = "AlarmID")]
    pub alarm_id: AlarmID,
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "LatestChangedAt")]
    pub latest_changed_at: DateTime<Utc>,
}

/// An outgoing snapshot of a user's currently-armed alarms, sorted ascending
/// by [`Alarm::latest_changed_at`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDigest {
    #[serde(rename = "UserID")]
    pub user_id: UserID,
    #[serde(rename = "ActiveAlarms")]
    pub active_alarms: Vec<Alarm>,
}

impl Subject for AlarmDigest {
    const SUBJECT: &'static str = "AlarmDigest";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_changed_rejects_empty_user_id() {
        let msg = AlarmStatusChanged {
            user_id: UserID::default(),
            alarm_id: AlarmID::from("a1"),
            status: Status::Critical,
            changed_at: instant(1),
        };
        assert!(matches!(
            msg.validate(),
            Err(ValidationError::EmptyField { field: "UserID" })
        ));
    }

    #[test]
    fn status_changed_rejects_zero_timestamp() {
        let msg = AlarmStatusChanged {
            user_id: UserID::from("u1"),
            alarm_id: AlarmID::from("a1"),
            status: Status::Critical,
            changed_at: DateTime::<Utc>::default(),
        };
        assert!(matches!(
            msg.validate(),
            Err(ValidationError::ZeroTimestamp { field: "ChangedAt" })
        ));
    }

    #[test]
    fn status_changed_accepts_well_formed_message() {
        let msg = AlarmStatusChanged {
            user_id: UserID::from("u1"),
            alarm_id: AlarmID::from("a1"),
            status: Status::Warning,
            changed_at: instant(100),
        };
        assert!(msg.validate().is_ok());
        assert_eq!(msg.shard_seed(), b"u1");
    }

    #[test]
    fn send_digest_rejects_empty_user_id() {
        let msg = SendAlarmDigest {
            user_id: UserID::default(),
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn wire_format_uses_pascal_case_field_names() {
        let msg = AlarmStatusChanged {
            user_id: UserID::from("u1"),
            alarm_id: AlarmID::from("a1"),
            status: Status::Critical,
            changed_at: instant(0).with_timezone(&Utc) + chrono::Duration::seconds(1),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["UserID"], "u1");
        assert_eq!(json["AlarmID"], "a1");
        assert_eq!(json["Status"], "CRITICAL");
        assert!(json.get("ChangedAt").is_some());
    }

    #[test]
    fn digest_round_trips_through_json() {
        let digest = AlarmDigest {
            user_id: UserID::from("u1"),
            active_alarms: vec![Alarm {
                alarm_id: AlarmID::from("a1"),
                status: Status::Warning,
                latest_changed_at: instant(5),
            }],
        };
        let json = serde_json::to_string(&digest).unwrap();
        let back: AlarmDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, back);
    }
}
