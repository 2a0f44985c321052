//! Encoding rules for every record that leaves the process
//!
//! The receiving service is not written in Rust, so the JSON we emit follows
//! a small, fixed contract:
//!
//! - keys are the struct field names, verbatim
//! - absent values are omitted, never written as `null`
//! - timestamps are UTC with microsecond precision and a literal `Z`
//!   (`2024-01-01T10:00:00.000000Z`)
//! - enums are written as their string tag and identifiers as their
//!   canonical string form (both handled by the serde derives)

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ErrlyResult;

/// `strftime` pattern used for every encoded timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT).map(|naive| naive.and_utc())
}

/// Serde adapter for `DateTime<Utc>` fields, use with
/// `#[serde(with = "errly_core::wire::timestamp")]`.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: String = Deserialize::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(|e| {
            serde::de::Error::custom(format!(
                "invalid timestamp '{}', expected YYYY-MM-DDTHH:MM:SS.ffffffZ: {}",
                raw, e
            ))
        })
    }
}

/// Recursively drops object members whose value is `null`.
///
/// Array elements are left alone: only fields can be absent.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            for member in map.values_mut() {
                strip_nulls(member);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_nulls(item);
            }
        }
        _ => {}
    }
}

pub fn to_value<T: Serialize + ?Sized>(record: &T) -> ErrlyResult<Value> {
    let mut value = serde_json::to_value(record)?;
    strip_nulls(&mut value);
    Ok(value)
}

pub fn encode<T: Serialize + ?Sized>(record: &T) -> ErrlyResult<String> {
    Ok(serde_json::to_string(&to_value(record)?)?)
}

pub fn encode_to_vec<T: Serialize + ?Sized>(record: &T) -> ErrlyResult<Vec<u8>> {
    Ok(serde_json::to_vec(&to_value(record)?)?)
}

pub fn decode<T: DeserializeOwned>(input: &str) -> ErrlyResult<T> {
    Ok(serde_json::from_str(input)?)
}
