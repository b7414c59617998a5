//! Tagged views over variable-shape raw values, and total coercions.
//!
//! Every function here accepts whatever the store handed back and returns a
//! value or `None`; nothing in this module can fail.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Placeholder for names and locations that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// Placeholder for display strings with no value.
pub const NOT_AVAILABLE: &str = "N/A";

/// Characters whose presence marks a string as (probably) JSON-encoded.
const JSON_STRUCTURAL: [char; 5] = ['{', '}', '[', ']', '"'];

// ─── Relations ───────────────────────────────────────────────────────────────

/// An embedded relation as it may arrive: one object, a list, or nothing.
#[derive(Debug, Clone, Copy)]
pub enum RelationShape<'a> {
  One(&'a Map<String, Value>),
  Many(&'a [Value]),
  Absent,
}

impl<'a> RelationShape<'a> {
  pub fn classify(value: Option<&'a Value>) -> Self {
    match value {
      Some(Value::Object(map)) => Self::One(map),
      Some(Value::Array(items)) => Self::Many(items),
      _ => Self::Absent,
    }
  }

  /// The related record to read from: the object itself, or the first
  /// element of a list. `None` stands in for the empty placeholder.
  pub fn primary(self) -> Option<&'a Map<String, Value>> {
    match self {
      Self::One(map) => Some(map),
      Self::Many(items) => items.first().and_then(Value::as_object),
      Self::Absent => None,
    }
  }
}

// ─── Locations ───────────────────────────────────────────────────────────────

/// A location as it may arrive.
#[derive(Debug, Clone, Copy)]
pub enum LocationShape<'a> {
  /// A bare name such as `"Lab-1"`.
  Plain(&'a str),
  /// A string carrying JSON, such as `"{\"name\":\"Lab-1\"}"`.
  Encoded(&'a str),
  Object(&'a Map<String, Value>),
  Missing,
}

impl<'a> LocationShape<'a> {
  pub fn classify(value: Option<&'a Value>) -> Self {
    match value {
      Some(Value::String(s)) if s.contains(JSON_STRUCTURAL) => Self::Encoded(s),
      Some(Value::String(s)) => Self::Plain(s),
      Some(Value::Object(map)) => Self::Object(map),
      _ => Self::Missing,
    }
  }

  /// The location name, if one can be recovered. Parse failures yield `None`.
  pub fn name(self) -> Option<String> {
    match self {
      Self::Plain(s) => non_blank(s),
      Self::Encoded(s) => match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => text(map.get("name")),
        _ => None,
      },
      Self::Object(map) => text(map.get("name")),
      Self::Missing => None,
    }
  }
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

fn non_blank(s: &str) -> Option<String> {
  let trimmed = s.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Text form of a raw value. Objects and arrays are serialised; `null`,
/// missing and blank strings give `None`.
pub fn text(value: Option<&Value>) -> Option<String> {
  match value {
    None | Some(Value::Null) => None,
    Some(Value::String(s)) => non_blank(s),
    Some(Value::Bool(b)) => Some(b.to_string()),
    Some(Value::Number(n)) => Some(n.to_string()),
    Some(other) => Some(other.to_string()),
  }
}

/// Like [`text`], but substitutes [`NOT_AVAILABLE`].
pub fn display(value: Option<&Value>) -> String {
  text(value).unwrap_or_else(|| NOT_AVAILABLE.to_owned())
}

/// A list of names from an array, a JSON-encoded array, or a comma-separated
/// string. Blank entries are dropped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
  match value {
    Some(Value::Array(items)) => {
      items.iter().filter_map(|item| text(Some(item))).collect()
    }
    Some(Value::String(s)) if s.trim_start().starts_with('[') => {
      match serde_json::from_str::<Value>(s) {
        Ok(parsed @ Value::Array(_)) => string_list(Some(&parsed)),
        _ => Vec::new(),
      }
    }
    Some(Value::String(s)) => s.split(',').filter_map(non_blank).collect(),
    _ => Vec::new(),
  }
}

/// A ratio in `[0, 1]`, from a number or a numeric string.
pub fn ratio(value: Option<&Value>) -> Option<f64> {
  let raw = match value? {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  (raw.is_finite() && (0.0..=1.0).contains(&raw)).then_some(raw)
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Naive layouts, interpreted as UTC. `%.f` also matches no fraction.
const NAIVE_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M",
];

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a raw timestamp: RFC 3339, SQL-style with offset, naive date-time,
/// bare date, or epoch seconds/milliseconds.
pub fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
  match value? {
    Value::String(s) => parse_timestamp(s.trim()),
    Value::Number(n) => n.as_i64().and_then(from_epoch),
    _ => None,
  }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
    return Some(dt.with_timezone(&Utc));
  }
  if let Some(naive) = NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
  {
    return Some(Utc.from_utc_datetime(&naive));
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
  }
  s.parse::<i64>().ok().and_then(from_epoch)
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
  if raw.unsigned_abs() > EPOCH_MILLIS_THRESHOLD.unsigned_abs() {
    Utc.timestamp_millis_opt(raw).single()
  } else {
    Utc.timestamp_opt(raw, 0).single()
  }
}
