//! Store traits and query descriptors.
//!
//! The store is opaque: this layer only needs select-with-relations, the
//! ability to tell an error apart from an empty result, and (for live views) a
//! feed of change notifications. `guardian-store-sqlite` implements all three.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::session::Session;

/// A raw row as returned by a store: column name → JSON value. Embedded
/// relations appear under their relation name.
pub type RawRow = Map<String, Value>;

// ─── Query descriptors ───────────────────────────────────────────────────────

/// How many related rows a relation embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
  /// Embed the first matching row as an object, or `null`.
  One,
  /// Embed all matching rows as an array.
  #[default]
  Many,
}

/// A related table embedded into each base row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
  /// Key under which the related rows are embedded.
  pub name:        String,
  pub table:       String,
  /// Columns to select from the related table; empty means all.
  pub fields:      Vec<String>,
  /// Column on the base row holding the join value.
  pub local_key:   String,
  /// Column on the related table matched against `local_key`.
  pub foreign_key: String,
  pub cardinality: Cardinality,
  /// Inner-join semantics: base rows without a related row are dropped.
  pub required:    bool,
}

impl Relation {
  /// A relation embedded under the related table's own name, joined on
  /// `local_key = foreign_key`.
  pub fn new(
    table: impl Into<String>,
    local_key: impl Into<String>,
    foreign_key: impl Into<String>,
  ) -> Self {
    let table = table.into();
    Self {
      name: table.clone(),
      table,
      fields: Vec::new(),
      local_key: local_key.into(),
      foreign_key: foreign_key.into(),
      cardinality: Cardinality::default(),
      required: false,
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn fields<I, F>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = F>,
    F: Into<String>,
  {
    self.fields = fields.into_iter().map(Into::into).collect();
    self
  }

  pub fn one(mut self) -> Self {
    self.cardinality = Cardinality::One;
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }
}

/// A select over one table, optionally embedding related tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
  pub table:     String,
  /// Columns to select; empty means all.
  pub fields:    Vec<String>,
  pub relations: Vec<Relation>,
}

impl Query {
  pub fn table(table: impl Into<String>) -> Self {
    Self { table: table.into(), fields: Vec::new(), relations: Vec::new() }
  }

  pub fn fields<I, F>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = F>,
    F: Into<String>,
  {
    self.fields = fields.into_iter().map(Into::into).collect();
    self
  }

  pub fn embed(mut self, relation: Relation) -> Self {
    self.relations.push(relation);
    self
  }

  /// Every table this query reads from.
  pub fn tables(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.table.as_str())
      .chain(self.relations.iter().map(|r| r.table.as_str()))
  }
}

// ─── Change notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// A row in `table` was inserted, updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
  pub table: String,
  pub kind:  ChangeKind,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Read access to a store.
///
/// An `Ok` with zero rows is a successful, empty result and must never be
/// reported as an error; errors are reserved for execution failures
/// (connectivity, permissions, malformed queries).
pub trait QueryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Execute `query` on behalf of `session`.
  fn execute<'a>(
    &'a self,
    session: &'a Session,
    query: &'a Query,
  ) -> impl Future<Output = Result<Vec<RawRow>, Self::Error>> + Send + 'a;
}

/// Write access used to ingest raw rows.
pub trait RowWriter: QueryStore {
  /// Insert `row` into `table`, replacing any row with the same primary key.
  /// Columns the table does not have are ignored.
  fn insert<'a>(
    &'a self,
    session: &'a Session,
    table: &'a str,
    row: RawRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete rows of `table` whose `key` column equals `value`. Returns the
  /// number of rows removed.
  fn delete<'a>(
    &'a self,
    session: &'a Session,
    table: &'a str,
    key: &'a str,
    value: &'a serde_json::Value,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}

/// A source of change notifications.
pub trait ChangeFeed {
  /// Register a new subscriber. The subscription ends when the receiver is
  /// dropped.
  fn subscribe(&self) -> broadcast::Receiver<Change>;
}
