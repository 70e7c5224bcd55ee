//! Small pure predicates and parsing utilities used throughout the engine.
//!
//! Everything here is side-effect free; validation failures are reported by
//! the callers with field-level context.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use url::Url;

/// A JSON object in the strict sense: not an array, not null.
pub fn is_object(value: &Value) -> bool {
    value.is_object()
}

/// A non-empty, non-whitespace string.
pub fn is_string(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        _ => false,
    }
}

/// A key: a non-empty string or a number.
pub fn is_key(value: &Value) -> bool {
    is_string(value) || value.is_number()
}

/// A finite integer (i64/u64 representable).
pub fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

/// A finite integer strictly greater than zero.
pub fn is_positive_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_i64().is_some_and(|v| v > 0) || n.as_u64().is_some_and(|v| v > 0),
        _ => false,
    }
}

/// A primitive scalar: string, number, boolean, or null.
pub fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null
    )
}

/// Parse a datetime out of a JSON value.
///
/// Accepts RFC 3339 strings, the common `YYYY-MM-DD HH:MM:SS[.fff]` form,
/// bare dates (interpreted at midnight UTC), and integer epoch milliseconds.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Parse a calendar date (no time component) out of a JSON value.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(value).map(|dt| dt.date_naive()))
        }
        Value::Number(_) => parse_datetime(value).map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Parse a time-of-day out of a JSON value.
pub fn parse_time(value: &Value) -> Option<NaiveTime> {
    let Value::String(s) = value else { return None };
    let s = s.trim();
    for fmt in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }
    None
}

/// Check an e-mail address for structural validity.
pub fn is_valid_email(text: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$").unwrap();
    re.is_match(text)
}

/// Check a link for structural validity: an absolute http(s) URL.
pub fn is_valid_link(text: &str) -> bool {
    match Url::parse(text) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Check a phone number: international format, digits with optional leading
/// `+`.
pub fn is_valid_phone(text: &str) -> bool {
    let re = Regex::new(r"^\+?[1-9][0-9]{3,14}$").unwrap();
    re.is_match(text)
}
