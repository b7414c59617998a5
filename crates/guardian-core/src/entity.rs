//! Entities: resolved identity records.
//!
//! Entities are value objects built fresh on every normalization pass. Their
//! display fields are always populated, so consumers never null-check them.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  Error,
  shape::{self, UNKNOWN},
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// The observed status of an entity.
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
pub enum EntityStatus {
  Active,
  Inactive,
  Safe,
  Alert,
  #[default]
  Unknown,
}

impl EntityStatus {
  pub const ALL: [Self; 5] =
    [Self::Active, Self::Inactive, Self::Safe, Self::Alert, Self::Unknown];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
      Self::Safe => "safe",
      Self::Alert => "alert",
      Self::Unknown => "unknown",
    }
  }

  /// Case-insensitive match against the known statuses.
  pub fn recognize(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(raw))
  }
}

impl fmt::Display for EntityStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::recognize(s).ok_or_else(|| Error::UnknownStatus(s.to_owned()))
  }
}

// ─── Location ────────────────────────────────────────────────────────────────

/// Canonical location shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub name: String,
}

impl Location {
  pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }

  pub fn unknown() -> Self { Self::new(UNKNOWN) }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Display details taken from the related profile; `"N/A"` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
  pub department: String,
  pub course:     String,
  pub roll_no:    String,
}

impl ProfileDetails {
  pub fn from_relation(profile: Option<&Map<String, Value>>) -> Self {
    let field = |key: &str| shape::display(profile.and_then(|p| p.get(key)));
    Self {
      department: field("department"),
      course:     field("course"),
      roll_no:    field("roll_no"),
    }
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:    String,
  pub user_id:      Option<String>,
  pub display_name: String,
  pub status:       EntityStatus,
  /// `None` means the entity has never been observed.
  pub last_seen:    Option<DateTime<Utc>>,
  pub location:     Location,
  pub aliases:      Vec<String>,
  /// Resolution confidence in `[0, 1]`, when the source reports one.
  pub confidence:   Option<f64>,
  pub card_id:      Option<String>,
  pub device_hash:  Option<String>,
  pub profile:      ProfileDetails,
}

// ─── Filtering ───────────────────────────────────────────────────────────────

/// Filter over a list of entities. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
  text:   Option<String>,
  status: Option<EntityStatus>,
}

impl EntityFilter {
  pub fn all() -> Self { Self::default() }

  /// Case-insensitive substring over id, display name, aliases, user id,
  /// card id and device hash. Blank text is ignored.
  pub fn text(mut self, text: impl AsRef<str>) -> Self {
    let text = text.as_ref().trim();
    self.text = (!text.is_empty()).then(|| text.to_lowercase());
    self
  }

  pub fn status(mut self, status: Option<EntityStatus>) -> Self {
    self.status = status;
    self
  }

  pub fn matches(&self, entity: &Entity) -> bool {
    if self.status.is_some_and(|s| s != entity.status) {
      return false;
    }
    let Some(needle) = &self.text else {
      return true;
    };
    let hit = |hay: &str| hay.to_lowercase().contains(needle.as_str());
    hit(&entity.entity_id)
      || hit(&entity.display_name)
      || entity.aliases.iter().any(|a| hit(a))
      || entity.user_id.as_deref().is_some_and(hit)
      || entity.card_id.as_deref().is_some_and(hit)
      || entity.device_hash.as_deref().is_some_and(hit)
  }

  pub fn apply<'a>(
    &'a self,
    entities: &'a [Entity],
  ) -> impl Iterator<Item = &'a Entity> + 'a {
    entities.iter().filter(move |e| self.matches(e))
  }
}

/// Per-status counts over a list of entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
  pub total:     usize,
  pub by_status: BTreeMap<EntityStatus, usize>,
}

impl EntitySummary {
  pub fn of(entities: &[Entity]) -> Self {
    let mut by_status = BTreeMap::new();
    for entity in entities {
      *by_status.entry(entity.status).or_insert(0) += 1;
    }
    Self { total: entities.len(), by_status }
  }
}
