//! # Value
//! The shapes a remote document can hold. Remote stores hand us their own timestamp
//! representation ([`Value::Timestamp`]); everything in memory expects a `chrono` date-time.
//! [`Value::normalize`] walks a value and converts the former into the latter, leaving the rest
//! of the structure alone.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

/// Top-level (or nested) fields of a document. Insertion order is preserved.
pub type Fields = IndexMap<String, Value>;

/// A point in time as the backend stores it.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BackendTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl BackendTimestamp {
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self {
            seconds: datetime.timestamp(),
            nanos: datetime.timestamp_subsec_nanos(),
        }
    }

    /// Returns `None` when the timestamp is outside the range `chrono` can represent.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Map(Fields),
    /// Backend timestamp, as read from a store.
    Timestamp(BackendTimestamp),
    /// Normalized timestamp.
    DateTime(DateTime<Utc>),
    /// Write-only sentinel: the store fills in its own clock when the write commits.
    ServerTimestamp,
}

impl Value {
    /// Replace every backend timestamp (at any depth) with a `chrono` date-time.
    ///
    /// Arrays keep their order and maps keep their key order. Normalizing an already
    /// normalized value returns it unchanged.
    pub fn normalize(self) -> Value {
        match self {
            Value::Timestamp(timestamp) => match timestamp.to_datetime() {
                Some(datetime) => Value::DateTime(datetime),
                None => {
                    log::warn!("Dropping out-of-range backend timestamp {timestamp:?}");
                    Value::Null
                }
            },
            Value::Array(items) => Value::Array(items.into_iter().map(Value::normalize).collect()),
            Value::Map(fields) => Value::Map(normalize_fields(fields)),
            scalar => scalar,
        }
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

pub fn normalize_fields(fields: Fields) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| (key, value.normalize()))
        .collect()
}

/// Converts normalized fields into JSON so they can be decoded with `serde`.
pub fn fields_to_json(fields: Fields) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::from(value)))
            .collect(),
    )
}

fn datetime_to_json(datetime: DateTime<Utc>) -> serde_json::Value {
    serde_json::Value::String(datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null | Value::ServerTimestamp => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::from(i),
            Value::Double(d) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(fields) => fields_to_json(fields),
            Value::Timestamp(timestamp) => timestamp
                .to_datetime()
                .map(datetime_to_json)
                .unwrap_or(serde_json::Value::Null),
            Value::DateTime(datetime) => datetime_to_json(datetime),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}
