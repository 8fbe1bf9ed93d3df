//! Timestamp values as they appear in exported review documents.
//!
//! The document database has a native timestamp type; in JSON it is the
//! object `{"_seconds": <i64>, "_nanoseconds": <u32>}`. Anything else,
//! including an ISO-8601 string, is not a timestamp.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

pub const SECONDS_KEY: &str = "_seconds";
pub const NANOS_KEY: &str = "_nanoseconds";

/// Naive layouts accepted for string dates, read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

pub fn encode(at: DateTime<Utc>) -> Value {
    json!({
        SECONDS_KEY: at.timestamp(),
        NANOS_KEY: at.timestamp_subsec_nanos(),
    })
}

pub fn decode(value: &Value) -> Option<DateTime<Utc>> {
    let map = value.as_object()?;
    let seconds = map.get(SECONDS_KEY)?.as_i64()?;
    let nanos = u32::try_from(map.get(NANOS_KEY)?.as_u64()?).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}

pub fn is_timestamp(value: &Value) -> bool {
    decode(value).is_some()
}

/// Parse a string-encoded date the way legacy clients wrote them.
pub fn parse_date_string(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
