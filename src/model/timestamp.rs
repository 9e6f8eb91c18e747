//! Lenient (de)serialisation of optional timestamps.
//!
//! The backend sends epoch milliseconds, but older records carry numeric strings
//! or RFC 3339 dates. Anything unparsable becomes `None` rather than failing the
//! whole election.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn serialize<S>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match time {
        Some(time) => serializer.serialize_i64(time.timestamp_millis()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse))
}

/// Interpret a JSON value as a point in time.
pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_millis),
        Value::String(s) => parse_str(s),
        _ => None,
    };
    if parsed.is_none() {
        warn!("Ignoring unparsable timestamp {value}");
    }
    parsed
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(millis) = s.parse::<i64>() {
        return from_millis(millis);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
