//! The standard fallback sequences for the Guardian schema.

use std::collections::BTreeSet;

use crate::{
  normalize::{EntityMapping, EventMapping},
  resolve::Descriptor,
  store::{Query, Relation},
};

pub const ENTRY_TABLE: &str = "entry";
pub const PROFILES_TABLE: &str = "profiles";
pub const EVENTS_TABLE: &str = "events";

/// One logical event source and its fallback sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
  pub name:        String,
  pub descriptors: Vec<Descriptor<EventMapping>>,
}

/// Every fallback sequence the service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
  pub entities:      Vec<Descriptor<EntityMapping>>,
  pub event_sources: Vec<EventSource>,
}

impl Catalog {
  /// All tables any descriptor reads from. Live views recompute only for
  /// changes to these.
  pub fn tables(&self) -> BTreeSet<String> {
    let entity_queries = self.entities.iter().map(|d| &d.query);
    let event_queries = self
      .event_sources
      .iter()
      .flat_map(|s| s.descriptors.iter().map(|d| &d.query));
    entity_queries
      .chain(event_queries)
      .flat_map(|q| q.tables())
      .map(str::to_owned)
      .collect()
  }
}

fn profile_relation() -> Relation {
  Relation::new(PROFILES_TABLE, "user_id", "id")
    .fields(["id", "full_name", "department", "course", "roll_no"])
    .one()
}

impl Default for Catalog {
  /// Entries with their profile embedded, falling back to bare entries, and
  /// likewise for events. The profile is embedded as an optional relation:
  /// rows without a profile are kept with `profiles: null`.
  fn default() -> Self {
    let entities = vec![
      Descriptor::new(
        "entry with profile",
        Query::table(ENTRY_TABLE).embed(profile_relation()),
        EntityMapping::default(),
      ),
      Descriptor::new(
        "entry",
        Query::table(ENTRY_TABLE),
        EntityMapping::default(),
      ),
    ];

    let events = EventSource {
      name:        EVENTS_TABLE.to_owned(),
      descriptors: vec![
        Descriptor::new(
          "events with profile",
          Query::table(EVENTS_TABLE).embed(profile_relation()),
          EventMapping::default(),
        ),
        Descriptor::new(
          "events",
          Query::table(EVENTS_TABLE),
          EventMapping::default(),
        ),
      ],
    };

    Self { entities, event_sources: vec![events] }
  }
}
