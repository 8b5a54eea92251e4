//! JSON serialization policy handed to each client variant.
//!
//! Timestamps are always *read* leniently (RFC 3339 string or epoch
//! milliseconds). The policy only decides how they are *written*.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// How date/time values are written to JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateEncoding {
    /// RFC 3339 / ISO-8601 strings, e.g. `2024-01-01T00:00:00Z`
    #[default]
    #[serde(rename = "iso8601")]
    Iso8601,
    /// Integer milliseconds since the Unix epoch
    #[serde(rename = "epoch_millis")]
    EpochMillis,
}

impl std::fmt::Display for DateEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateEncoding::Iso8601 => write!(f, "iso8601"),
            DateEncoding::EpochMillis => write!(f, "epoch_millis"),
        }
    }
}

thread_local! {
    /// Encoding `timestamp::serialize` writes with on this thread
    static WRITE_DATES: Cell<DateEncoding> = const { Cell::new(DateEncoding::Iso8601) };
}

/// Sets the thread's date encoding for one `encode` call, restoring on drop
struct DatesScope(DateEncoding);

impl DatesScope {
    fn enter(dates: DateEncoding) -> Self {
        Self(WRITE_DATES.with(|cell| cell.replace(dates)))
    }
}

impl Drop for DatesScope {
    fn drop(&mut self) {
        WRITE_DATES.with(|cell| cell.set(self.0));
    }
}

/// Serialization policy for request and response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerializationPolicy {
    pub dates: DateEncoding,
}

impl SerializationPolicy {
    pub fn iso8601() -> Self {
        Self {
            dates: DateEncoding::Iso8601,
        }
    }

    pub fn epoch_millis() -> Self {
        Self {
            dates: DateEncoding::EpochMillis,
        }
    }

    /// Encode a value as a JSON body
    ///
    /// Only fields declared with the `timestamp` adapter follow the date
    /// encoding; strings are written as-is.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        let _scope = DatesScope::enter(self.dates);
        serde_json::to_vec(value)
    }

    /// Decode a JSON body
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Serde adapter for `DateTime<Utc>` fields of the registry models
pub mod timestamp {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        match WRITE_DATES.with(Cell::get) {
            DateEncoding::Iso8601 => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            DateEncoding::EpochMillis => serializer.serialize_i64(value.timestamp_millis()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(de::Error::custom),
            Raw::Millis(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {millis}"))),
        }
    }
}
