//! Call log data model
//!
//! A call record is written once, when the softphone reports the end of a
//! call, and afterwards only its `hidden` flag and `notes` change.

use crate::{CallboardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a call, assigned once when the call ends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Completed,
    #[serde(alias = "missed")]
    Canceled,
    #[serde(alias = "failed")]
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Completed => "completed",
            CallStatus::Canceled => "canceled",
            CallStatus::Error => "error",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown call status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CallStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" => Ok(CallStatus::Completed),
            "canceled" | "cancelled" | "missed" => Ok(CallStatus::Canceled),
            "error" | "failed" => Ok(CallStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Whether the office placed the call or received it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// One persisted phone call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogRecord {
    pub id: i64,
    #[serde(rename = "to")]
    pub to_number: String,
    #[serde(rename = "from")]
    pub from_number: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub status: CallStatus,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub notes: String,
}

impl CallLogRecord {
    /// Calls whose caller is the office line are outgoing, everything else incoming.
    pub fn direction(&self, office_number: &str) -> CallDirection {
        if self.from_number == office_number {
            CallDirection::Outgoing
        } else {
            CallDirection::Incoming
        }
    }
}

/// Create request as received from the softphone
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCallLog {
    pub to: Option<String>,
    pub from: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub status: Option<String>,
}

/// A create request that passed validation and is ready to insert
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallLogDraft {
    pub to_number: String,
    pub from_number: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub status: CallStatus,
}

impl NewCallLog {
    pub fn validate(self) -> Result<CallLogDraft> {
        let to_number = require_number("to", self.to)?;
        let from_number = require_number("from", self.from)?;

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => return Err(CallboardError::Validation("status is required".into())),
            Some(raw) => raw
                .parse::<CallStatus>()
                .map_err(|e| CallboardError::Validation(e.to_string()))?,
        };

        if let (Some(start), Some(end)) = (self.started_at, self.ended_at) {
            if end < start {
                return Err(CallboardError::Validation(
                    "endedAt is before startedAt".into(),
                ));
            }
        }

        let duration_seconds = match self.duration_seconds {
            Some(secs) if secs < 0 => {
                return Err(CallboardError::Validation(
                    "durationSeconds must not be negative".into(),
                ))
            }
            Some(secs) => secs as u64,
            None => match (self.started_at, self.ended_at) {
                (Some(start), Some(end)) => (end - start).num_seconds().max(0) as u64,
                _ => 0,
            },
        };

        Ok(CallLogDraft {
            to_number,
            from_number,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds,
            status,
        })
    }
}

fn require_number(field: &str, value: Option<String>) -> Result<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(CallboardError::Validation(format!("{field} is required")));
    }
    if !is_e164(&value) {
        return Err(CallboardError::Validation(format!(
            "{field} must be an E.164 number, got {value:?}"
        )));
    }
    Ok(value)
}

/// `+` followed by 1 to 15 digits
pub fn is_e164(number: &str) -> bool {
    match number.strip_prefix('+') {
        Some(digits) => {
            !digits.is_empty() && digits.len() <= 15 && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Call identifier as it shows up in JSON bodies: either a number or a numeric string
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCallId {
    Number(i64),
    Text(String),
}

impl RawCallId {
    pub fn resolve(raw: Option<&RawCallId>) -> Result<i64> {
        match raw {
            None => Err(CallboardError::Validation("Missing ID".into())),
            Some(RawCallId::Number(id)) => Ok(*id),
            Some(RawCallId::Text(text)) => parse_call_id(Some(text)),
        }
    }
}

/// Parse an `id` query parameter
pub fn parse_call_id(raw: Option<&str>) -> Result<i64> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(CallboardError::Validation("Missing ID".into()));
    }
    raw.parse::<i64>()
        .map_err(|_| CallboardError::Validation(format!("Invalid ID: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> NewCallLog {
        NewCallLog {
            to: Some("+1555".into()),
            from: Some("+1777".into()),
            status: Some("completed".into()),
            ..Default::default()
        }
    }

    #[test]
    fn duration_derived_from_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let draft = NewCallLog {
            started_at: Some(start),
            ended_at: Some(start + chrono::Duration::seconds(95)),
            ..request()
        }
        .validate()
        .unwrap();
        assert_eq!(draft.duration_seconds, 95);
    }

    #[test]
    fn duration_defaults_to_zero() {
        let draft = request().validate().unwrap();
        assert_eq!(draft.duration_seconds, 0);
        assert_eq!(draft.status, CallStatus::Completed);
    }

    #[test]
    fn rejects_missing_fields() {
        let missing_to = NewCallLog { to: None, ..request() }.validate();
        assert!(matches!(missing_to, Err(CallboardError::Validation(_))));

        let missing_status = NewCallLog { status: None, ..request() }.validate();
        assert!(matches!(missing_status, Err(CallboardError::Validation(_))));

        let negative = NewCallLog {
            duration_seconds: Some(-3),
            ..request()
        }
        .validate();
        assert!(matches!(negative, Err(CallboardError::Validation(_))));
    }

    #[test]
    fn rejects_non_e164_numbers() {
        assert!(is_e164("+493042430344"));
        assert!(!is_e164("493042430344"));
        assert!(!is_e164("+"));
        assert!(!is_e164("+49 30 4243"));
        assert!(!is_e164("+1234567890123456"));
    }

    #[test]
    fn status_aliases() {
        assert_eq!("missed".parse::<CallStatus>().unwrap(), CallStatus::Canceled);
        assert_eq!("FAILED".parse::<CallStatus>().unwrap(), CallStatus::Error);
        assert!("ringing".parse::<CallStatus>().is_err());
    }

    #[test]
    fn call_ids() {
        assert_eq!(parse_call_id(Some("42")).unwrap(), 42);
        assert!(parse_call_id(None).is_err());
        assert!(parse_call_id(Some("abc")).is_err());
        assert_eq!(RawCallId::resolve(Some(&RawCallId::Number(7))).unwrap(), 7);
        assert_eq!(
            RawCallId::resolve(Some(&RawCallId::Text("8".into()))).unwrap(),
            8
        );
    }

    #[test]
    fn record_json_uses_public_field_names() {
        let record = CallLogRecord {
            id: 1,
            to_number: "+1555".into(),
            from_number: "+1777".into(),
            started_at: None,
            ended_at: None,
            duration_seconds: 42,
            status: CallStatus::Completed,
            hidden: false,
            notes: String::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["to"], "+1555");
        assert_eq!(json["from"], "+1777");
        assert_eq!(json["durationSeconds"], 42);
        assert_eq!(json["status"], "completed");
    }
}
