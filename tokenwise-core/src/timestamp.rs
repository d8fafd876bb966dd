//! Lenient timestamp (de)serialization
//!
//! The backend serializes naive UTC datetimes (`2024-05-01T12:30:00.123456`)
//! without an offset, while other producers send RFC 3339 strings or epoch
//! seconds. All three decode to `DateTime<Utc>`; serialization always emits
//! RFC 3339.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Seconds(i64),
}

/// Parse a timestamp string, accepting both offset and naive (UTC) forms
pub fn parse(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(text) => parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", text))),
        RawTimestamp::Seconds(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs))),
    }
}

/// Same as the parent module, for `Option<DateTime<Utc>>` fields
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawTimestamp::Text(text)) => parse(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", text))),
            Some(RawTimestamp::Seconds(secs)) => Ok(DateTime::from_timestamp(secs, 0)),
        }
    }
}
