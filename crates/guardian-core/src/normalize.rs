//! Shape normalizer: raw rows → canonical [`Entity`] / [`TimelineEvent`].
//!
//! Each canonical field has exactly one total resolution function. When a
//! field has to fall back to its default, the field is recorded in
//! [`Normalized::defaulted`]; normalization itself never fails.
//!
//! Which raw keys feed which canonical field is described by a mapping
//! ([`EntityMapping`], [`EventMapping`]) carried on each query descriptor, so
//! the same normalizer serves joined and un-joined result sets alike.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  entity::{Entity, EntityStatus, Location, ProfileDetails},
  event::{Actor, EventType, Severity, TimelineEvent},
  shape::{self, LocationShape, RelationShape, UNKNOWN},
  store::RawRow,
};

/// Fallback `user_id` for events attributed to nobody.
pub const SYSTEM_USER: &str = "system";

/// Fallback `location_id` for events without one.
pub const UNKNOWN_LOCATION_ID: &str = "unknown";

/// Namespace for event ids derived from row content.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c4e_9a3b_5e07_b8c1_4d2a_93f6_0e7c);

// ─── Context ─────────────────────────────────────────────────────────────────

/// Inputs shared by every row of one normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeContext {
  /// Processing time; the last-resort timestamp for events.
  pub now:                DateTime<Utc>,
  /// Type given to events whose raw type is missing or unrecognised.
  pub default_event_type: EventType,
}

impl NormalizeContext {
  pub fn new(now: DateTime<Utc>) -> Self {
    Self { now, default_event_type: EventType::default() }
  }

  pub fn with_default_event_type(mut self, event_type: EventType) -> Self {
    self.default_event_type = event_type;
    self
  }
}

impl Default for NormalizeContext {
  fn default() -> Self { Self::new(Utc::now()) }
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// Canonical fields that may be substituted by a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
  EntityId,
  DisplayName,
  Status,
  LastSeen,
  Location,
  EventId,
  EventType,
  OccurredAt,
  Details,
  LocationId,
  UserId,
  Severity,
  Source,
}

/// A canonical value plus the fields that were defaulted to build it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
  pub value:     T,
  pub defaulted: Vec<Field>,
}

impl<T> Normalized<T> {
  /// `true` when no field had to be defaulted.
  pub fn is_complete(&self) -> bool { self.defaulted.is_empty() }

  pub fn was_defaulted(&self, field: Field) -> bool {
    self.defaulted.contains(&field)
  }

  pub fn into_value(self) -> T { self.value }
}

/// Records defaulted fields while a row is being resolved.
#[derive(Default)]
struct Defaults(Vec<Field>);

impl Defaults {
  fn or_else<T>(
    &mut self,
    field: Field,
    value: Option<T>,
    fallback: impl FnOnce() -> T,
  ) -> T {
    value.unwrap_or_else(|| {
      self.0.push(field);
      fallback()
    })
  }

  fn finish<T>(self, value: T) -> Normalized<T> {
    Normalized { value, defaulted: self.0 }
  }
}

/// A mapping that turns one raw row into a canonical record.
pub trait Normalize {
  type Output;

  fn normalize(
    &self,
    row: &RawRow,
    ctx: &NormalizeContext,
  ) -> Normalized<Self::Output>;
}

/// First non-empty text among `keys`.
fn first_text(row: &RawRow, keys: &[String]) -> Option<String> {
  keys.iter().find_map(|k| shape::text(row.get(k)))
}

/// Stable id for an id-less row: the same row content always yields the same
/// id. `RawRow` keys are sorted, so its JSON text is canonical.
fn derived_event_id(row: &RawRow) -> String {
  let canonical = serde_json::Value::Object(row.clone()).to_string();
  Uuid::new_v5(&EVENT_ID_NAMESPACE, canonical.as_bytes()).to_string()
}

fn owned(keys: &[&str]) -> Vec<String> {
  keys.iter().map(|k| (*k).to_owned()).collect()
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Raw keys feeding each [`Entity`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
  /// Candidate id columns, in order of preference.
  pub id_fields:           Vec<String>,
  pub user_field:          String,
  /// Key of the embedded profile relation.
  pub relation:            String,
  /// Name column inside the relation.
  pub relation_name_field: String,
  /// Row-level name, used when the relation has none.
  pub name_field:          String,
  pub status_field:        String,
  pub last_seen_field:     String,
  pub location_field:      String,
  pub aliases_field:       String,
  pub confidence_field:    String,
  pub card_field:          String,
  pub device_field:        String,
}

impl Default for EntityMapping {
  fn default() -> Self {
    Self {
      id_fields:           owned(&["entry_id", "id"]),
      user_field:          "user_id".into(),
      relation:            "profiles".into(),
      relation_name_field: "full_name".into(),
      name_field:          "primary_name".into(),
      status_field:        "status".into(),
      last_seen_field:     "last_seen".into(),
      location_field:      "location".into(),
      aliases_field:       "aliases".into(),
      confidence_field:    "confidence_score".into(),
      card_field:          "card_id".into(),
      device_field:        "device_hash".into(),
    }
  }
}

impl Normalize for EntityMapping {
  type Output = Entity;

  fn normalize(&self, row: &RawRow, _ctx: &NormalizeContext) -> Normalized<Entity> {
    let mut defaults = Defaults::default();
    let profile = RelationShape::classify(row.get(&self.relation)).primary();

    let raw_id = first_text(row, &self.id_fields);
    let user_id = shape::text(row.get(&self.user_field));

    // Name precedence: profile name, row name, user id, the entity's own id.
    let name = profile
      .and_then(|p| shape::text(p.get(&self.relation_name_field)))
      .or_else(|| shape::text(row.get(&self.name_field)));
    let display_name = defaults.or_else(Field::DisplayName, name, || {
      user_id
        .clone()
        .or_else(|| raw_id.clone())
        .unwrap_or_else(|| UNKNOWN.to_owned())
    });

    let entity_id = defaults.or_else(Field::EntityId, raw_id, || {
      user_id.clone().unwrap_or_else(|| UNKNOWN.to_owned())
    });

    let status = defaults.or_else(
      Field::Status,
      shape::text(row.get(&self.status_field))
        .and_then(|s| EntityStatus::recognize(&s)),
      EntityStatus::default,
    );

    // Absent is a legitimate "never seen"; only garbage counts as defaulted.
    let raw_last_seen = row.get(&self.last_seen_field);
    let last_seen = shape::timestamp(raw_last_seen);
    if last_seen.is_none() && shape::text(raw_last_seen).is_some() {
      defaults.0.push(Field::LastSeen);
    }

    let location = defaults.or_else(
      Field::Location,
      LocationShape::classify(row.get(&self.location_field))
        .name()
        .map(Location::new),
      Location::unknown,
    );

    defaults.finish(Entity {
      entity_id,
      user_id,
      display_name,
      status,
      last_seen,
      location,
      aliases: shape::string_list(row.get(&self.aliases_field)),
      confidence: shape::ratio(row.get(&self.confidence_field)),
      card_id: shape::text(row.get(&self.card_field)),
      device_hash: shape::text(row.get(&self.device_field)),
      profile: ProfileDetails::from_relation(profile),
    })
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Raw keys feeding each [`TimelineEvent`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMapping {
  pub id_fields:           Vec<String>,
  pub type_field:          String,
  /// Candidate occurrence-time columns, in order of preference.
  pub time_fields:         Vec<String>,
  /// Record-creation time, the second-choice timestamp.
  pub created_field:       String,
  pub details_field:       String,
  pub location_field:      String,
  pub user_field:          String,
  pub relation:            String,
  pub relation_name_field: String,
  pub severity_field:      String,
  pub source_field:        String,
}

impl Default for EventMapping {
  fn default() -> Self {
    Self {
      id_fields:           owned(&["id", "event_id"]),
      type_field:          "event_type".into(),
      time_fields:         owned(&["entry_time", "occurred_at", "timestamp"]),
      created_field:       "created_at".into(),
      details_field:       "details".into(),
      location_field:      "location_id".into(),
      user_field:          "user_id".into(),
      relation:            "profiles".into(),
      relation_name_field: "full_name".into(),
      severity_field:      "severity".into(),
      source_field:        "source".into(),
    }
  }
}

impl Normalize for EventMapping {
  type Output = TimelineEvent;

  fn normalize(
    &self,
    row: &RawRow,
    ctx: &NormalizeContext,
  ) -> Normalized<TimelineEvent> {
    let mut defaults = Defaults::default();

    let event_id = defaults.or_else(
      Field::EventId,
      first_text(row, &self.id_fields),
      || derived_event_id(row),
    );

    let event_type = defaults.or_else(
      Field::EventType,
      shape::text(row.get(&self.type_field))
        .and_then(|t| EventType::recognize(&t)),
      || ctx.default_event_type,
    );

    let occurred = self
      .time_fields
      .iter()
      .find_map(|k| shape::timestamp(row.get(k)));
    let occurred_at = defaults.or_else(Field::OccurredAt, occurred, || {
      shape::timestamp(row.get(&self.created_field)).unwrap_or(ctx.now)
    });

    let details = defaults.or_else(
      Field::Details,
      shape::text(row.get(&self.details_field)),
      || format!("Event {event_id}"),
    );

    let raw_location = row.get(&self.location_field);
    let location_id = defaults.or_else(
      Field::LocationId,
      LocationShape::classify(raw_location)
        .name()
        .or_else(|| shape::text(raw_location)),
      || UNKNOWN_LOCATION_ID.to_owned(),
    );

    let raw_user = shape::text(row.get(&self.user_field));
    let profile = RelationShape::classify(row.get(&self.relation)).primary();
    let display_name = profile
      .and_then(|p| shape::text(p.get(&self.relation_name_field)))
      .or_else(|| raw_user.clone())
      .unwrap_or_else(|| UNKNOWN.to_owned());
    let user_id =
      defaults.or_else(Field::UserId, raw_user, || SYSTEM_USER.to_owned());

    let severity = defaults.or_else(
      Field::Severity,
      shape::text(row.get(&self.severity_field))
        .and_then(|s| Severity::recognize(&s)),
      || Severity::implied_by(event_type),
    );

    let source = defaults.or_else(
      Field::Source,
      shape::text(row.get(&self.source_field)),
      || event_type.default_source().to_owned(),
    );

    defaults.finish(TimelineEvent {
      event_id,
      event_type,
      occurred_at,
      actor: Actor { user_id, display_name },
      location_id,
      details,
      severity,
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::{Value, json};

  use super::*;

  fn row(value: Value) -> RawRow {
    value.as_object().cloned().expect("object literal")
  }

  fn ctx() -> NormalizeContext {
    NormalizeContext::new(Utc.with_ymd_and_hms(2024, 10, 21, 12, 0, 0).unwrap())
  }

  fn entity(value: Value) -> Normalized<Entity> {
    EntityMapping::default().normalize(&row(value), &ctx())
  }

  fn event(value: Value) -> Normalized<TimelineEvent> {
    EventMapping::default().normalize(&row(value), &ctx())
  }

  // ── Entities ─────────────────────────────────────────────────────────────

  #[test]
  fn entity_with_profile_and_encoded_location() {
    let n = entity(json!({
      "entry_id": "E1",
      "profiles": { "full_name": "Amy" },
      "location": "{\"name\":\"Lab-1\"}",
    }));
    assert_eq!(n.value.entity_id, "E1");
    assert_eq!(n.value.display_name, "Amy");
    assert_eq!(n.value.location, Location::new("Lab-1"));
    assert!(!n.was_defaulted(Field::DisplayName));
  }

  #[test]
  fn entity_without_relation_falls_back_to_id() {
    let n = entity(json!({ "entry_id": "E2", "profiles": [], "location": null }));
    assert_eq!(n.value.entity_id, "E2");
    assert_eq!(n.value.display_name, "E2");
    assert_eq!(n.value.location, Location::unknown());
    assert!(n.was_defaulted(Field::DisplayName));
    assert!(n.was_defaulted(Field::Location));
  }

  #[test]
  fn entity_name_prefers_user_id_over_entity_id() {
    let n = entity(json!({ "entry_id": "E3", "user_id": "u-77" }));
    assert_eq!(n.value.display_name, "u-77");
  }

  #[test]
  fn entity_relation_list_uses_first_profile() {
    let n = entity(json!({
      "entry_id": "E4",
      "profiles": [
        { "full_name": "Sarah Johnson", "department": "CS", "roll_no": 17 },
        { "full_name": "Someone Else" },
      ],
    }));
    assert_eq!(n.value.display_name, "Sarah Johnson");
    assert_eq!(n.value.profile.department, "CS");
    assert_eq!(n.value.profile.roll_no, "17");
    assert_eq!(n.value.profile.course, "N/A");
  }

  #[test]
  fn entity_status_and_last_seen() {
    let n = entity(json!({
      "entry_id": "E5",
      "status": "ALERT",
      "last_seen": "2024-10-20T09:20:00Z",
    }));
    assert_eq!(n.value.status, EntityStatus::Alert);
    assert_eq!(
      n.value.last_seen,
      Some(Utc.with_ymd_and_hms(2024, 10, 20, 9, 20, 0).unwrap())
    );
    assert!(!n.was_defaulted(Field::LastSeen));
    assert!(!n.was_defaulted(Field::Status));

    let missing = entity(json!({ "entry_id": "E6", "status": "dozing" }));
    assert_eq!(missing.value.status, EntityStatus::Unknown);
    assert!(missing.value.last_seen.is_none());
    assert!(missing.was_defaulted(Field::Status));
    assert!(!missing.was_defaulted(Field::LastSeen));

    let garbage = entity(json!({ "entry_id": "E7", "last_seen": "yesterday" }));
    assert!(garbage.value.last_seen.is_none());
    assert!(garbage.was_defaulted(Field::LastSeen));

    for extreme in [i64::MIN, i64::MAX] {
      let n = entity(json!({ "entry_id": "E8", "last_seen": extreme }));
      assert!(n.value.last_seen.is_none());
      assert!(n.was_defaulted(Field::LastSeen));
    }
  }

  #[test]
  fn entity_primary_name_ranks_below_profile_name() {
    let n = entity(json!({ "entry_id": "E10", "user_id": "u-10", "primary_name": "Ravi" }));
    assert_eq!(n.value.display_name, "Ravi");
    assert!(!n.was_defaulted(Field::DisplayName));

    let n = entity(json!({
      "entry_id": "E11",
      "primary_name": "Ravi",
      "profiles": { "full_name": "Ravi Menon" },
    }));
    assert_eq!(n.value.display_name, "Ravi Menon");
  }

  #[test]
  fn entity_card_and_device_are_optional() {
    let n = entity(json!({ "entry_id": "E12", "card_id": 7781, "device_hash": "a9f3c0de" }));
    assert_eq!(n.value.card_id.as_deref(), Some("7781"));
    assert_eq!(n.value.device_hash.as_deref(), Some("a9f3c0de"));

    let n = entity(json!({ "entry_id": "E13", "card_id": "  " }));
    assert!(n.value.card_id.is_none());
    assert!(n.value.device_hash.is_none());
  }

  #[test]
  fn entity_display_fields_always_populated() {
    let ids = [json!(null), json!("E9"), json!(9), json!({ "x": 1 }), json!("")];
    let profiles = [
      json!(null),
      json!([]),
      json!({}),
      json!([{ "full_name": null }]),
      json!({ "full_name": { "first": "Ann" } }),
      json!("not a relation"),
      json!([42]),
    ];
    let locations = [
      json!(null),
      json!(""),
      json!("Main Gate"),
      json!("{\"name\":\"Lab-2\"}"),
      json!("{\"floor\":3}"),
      json!("{broken"),
      json!({ "name": "Library" }),
      json!({ "name": null }),
      json!([1, 2]),
      json!(3.5),
    ];
    let users = [json!(null), json!("u-1"), json!(""), json!(["odd"])];

    for id in &ids {
      for profile in &profiles {
        for location in &locations {
          for user in &users {
            let n = entity(json!({
              "entry_id": id,
              "profiles": profile,
              "location": location,
              "user_id": user,
            }));
            let e = &n.value;
            assert!(!e.display_name.trim().is_empty(), "{e:?}");
            assert!(!e.location.name.trim().is_empty(), "{e:?}");
            assert!(!e.entity_id.trim().is_empty(), "{e:?}");
          }
        }
      }
    }
  }

  // ── Events ───────────────────────────────────────────────────────────────

  #[test]
  fn event_defaults_table() {
    let n = event(json!({ "id": 7 }));
    let e = &n.value;
    assert_eq!(e.event_id, "7");
    assert_eq!(e.event_type, EventType::Wifi);
    assert_eq!(e.occurred_at, ctx().now);
    assert_eq!(e.details, "Event 7");
    assert_eq!(e.location_id, "unknown");
    assert_eq!(e.actor.user_id, "system");
    assert_eq!(e.actor.display_name, "Unknown");
    assert_eq!(e.severity, Severity::Info);
    assert_eq!(e.source, "WiFi Log");
    for field in [
      Field::EventType,
      Field::OccurredAt,
      Field::Details,
      Field::LocationId,
      Field::UserId,
    ] {
      assert!(n.was_defaulted(field), "{field:?} not flagged");
    }
    assert!(!n.was_defaulted(Field::EventId));
  }

  #[test]
  fn event_default_type_is_configurable() {
    let ctx = ctx().with_default_event_type(EventType::Entry);
    let n = EventMapping::default()
      .normalize(&row(json!({ "id": "x", "event_type": "cctv" })), &ctx);
    assert_eq!(n.value.event_type, EventType::Entry);
    assert!(n.was_defaulted(Field::EventType));
  }

  #[test]
  fn event_time_falls_back_to_created_at() {
    let n = event(json!({
      "id": "a",
      "entry_time": "garbage",
      "created_at": "2024-10-20T08:00:00Z",
    }));
    assert_eq!(
      n.value.occurred_at,
      Utc.with_ymd_and_hms(2024, 10, 20, 8, 0, 0).unwrap()
    );
    assert!(n.was_defaulted(Field::OccurredAt));
  }

  #[test]
  fn event_fields_from_raw() {
    let n = event(json!({
      "id": "ev-1",
      "event_type": "SWIPE",
      "entry_time": "2024-10-20 09:25:00",
      "details": "Card CARD_8871 used",
      "location_id": "Main Gate",
      "user_id": "E-134",
      "profiles": { "full_name": "Amit Kumar" },
      "severity": "warning",
      "source": "Swipe Log",
    }));
    assert!(n.is_complete(), "defaulted: {:?}", n.defaulted);
    let e = n.into_value();
    assert_eq!(e.event_type, EventType::Swipe);
    assert_eq!(e.actor.display_name, "Amit Kumar");
    assert_eq!(e.actor.user_id, "E-134");
    assert_eq!(e.severity, Severity::Warning);
  }

  #[test]
  fn event_critical_implies_critical_severity() {
    let n = event(json!({ "id": "c", "event_type": "critical" }));
    assert_eq!(n.value.severity, Severity::Critical);
    assert_eq!(n.value.source, "Security Alert");
  }

  #[test]
  fn event_missing_id_is_generated() {
    let n = event(json!({ "details": "no id" }));
    assert!(!n.value.event_id.is_empty());
    assert!(n.was_defaulted(Field::EventId));
  }

  #[test]
  fn event_missing_id_is_stable_per_row() {
    let raw = json!({ "details": "no id", "entry_time": "2024-10-20T09:25:00Z" });
    let first = event(raw.clone());
    let second = event(raw);
    assert_eq!(first, second);

    let other = event(json!({ "details": "other", "entry_time": "2024-10-20T09:25:00Z" }));
    assert_ne!(first.value.event_id, other.value.event_id);
  }

  #[test]
  fn event_type_always_in_closed_set() {
    let raw_types = [
      json!(null),
      json!("wifi"),
      json!("EXIT"),
      json!("cctv"),
      json!(""),
      json!(3),
      json!({ "type": "swipe" }),
      json!(["entry"]),
      json!(" entry "),
    ];
    for raw in raw_types {
      let n = event(json!({ "id": "t", "event_type": raw }));
      assert!(EventType::ALL.contains(&n.value.event_type));
    }
  }
}
