//! Timeline events.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

// ─── EventType ───────────────────────────────────────────────────────────────

/// The closed set of event kinds a timeline can hold.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
  /// Also the default for unrecognised raw types.
  #[default]
  Wifi,
  Swipe,
  Critical,
  Entry,
  Exit,
}

impl EventType {
  pub const ALL: [Self; 5] =
    [Self::Wifi, Self::Swipe, Self::Critical, Self::Entry, Self::Exit];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Wifi => "wifi",
      Self::Swipe => "swipe",
      Self::Critical => "critical",
      Self::Entry => "entry",
      Self::Exit => "exit",
    }
  }

  /// Case-insensitive match against the closed set.
  pub fn recognize(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(raw))
  }

  /// Source label used when a raw event does not name its source.
  pub fn default_source(self) -> &'static str {
    match self {
      Self::Wifi => "WiFi Log",
      Self::Swipe => "Swipe Log",
      Self::Critical => "Security Alert",
      Self::Entry | Self::Exit => "Access Log",
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::recognize(s).ok_or_else(|| Error::UnknownEventType(s.to_owned()))
  }
}

// ─── Severity ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  #[default]
  Info,
  Warning,
  Critical,
}

impl Severity {
  pub const ALL: [Self; 3] = [Self::Info, Self::Warning, Self::Critical];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Warning => "warning",
      Self::Critical => "critical",
    }
  }

  /// Case-insensitive. Also accepts the alert scale, where `high`, `medium`
  /// and `low` map to critical, warning and info.
  pub fn recognize(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    let alert_scale = [("high", Self::Critical), ("medium", Self::Warning), ("low", Self::Info)];
    Self::ALL
      .into_iter()
      .find(|s| s.as_str().eq_ignore_ascii_case(raw))
      .or_else(|| {
        alert_scale
          .into_iter()
          .find(|(name, _)| name.eq_ignore_ascii_case(raw))
          .map(|(_, s)| s)
      })
  }

  /// Severity implied by the event type alone.
  pub fn implied_by(event_type: EventType) -> Self {
    match event_type {
      EventType::Critical => Self::Critical,
      _ => Self::Info,
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Severity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::recognize(s).ok_or_else(|| Error::UnknownSeverity(s.to_owned()))
  }
}

// ─── TimelineEvent ───────────────────────────────────────────────────────────

/// Who an event is about. A placeholder actor has `display_name == "Unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id:      String,
  pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
  pub event_id:    String,
  pub event_type:  EventType,
  /// Always set; falls back to creation time, then processing time.
  pub occurred_at: DateTime<Utc>,
  pub actor:       Actor,
  pub location_id: String,
  pub details:     String,
  pub severity:    Severity,
  /// Logical source the event came from, e.g. "Swipe Log".
  pub source:      String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn event_type_parsing() {
    assert_eq!("Swipe".parse::<EventType>().unwrap(), EventType::Swipe);
    assert!(matches!(
      "cctv".parse::<EventType>(),
      Err(Error::UnknownEventType(raw)) if raw == "cctv"
    ));
  }

  #[test]
  fn severity_implied_by_type() {
    assert_eq!(Severity::implied_by(EventType::Critical), Severity::Critical);
    assert_eq!(Severity::implied_by(EventType::Exit), Severity::Info);
  }

  #[test]
  fn severity_accepts_alert_scale() {
    assert_eq!(Severity::recognize("High"), Some(Severity::Critical));
    assert_eq!(Severity::recognize(" medium "), Some(Severity::Warning));
    assert_eq!("LOW".parse::<Severity>().unwrap(), Severity::Info);
    assert_eq!(Severity::recognize("Warning"), Some(Severity::Warning));
    assert!(Severity::recognize("urgent").is_none());
  }

  #[test]
  fn serde_names_match_as_str() {
    for t in EventType::ALL {
      assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
    }
    for s in Severity::ALL {
      assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
    }
  }
}
