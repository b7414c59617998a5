//! [`SqliteStore`]: the SQLite implementation of the Guardian store traits.

use std::{collections::HashMap, path::Path, sync::Arc};

use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use guardian_core::{
  session::Session,
  store::{
    Cardinality, Change, ChangeFeed, ChangeKind, Query, QueryStore, RawRow, Relation,
    RowWriter,
  },
};

use crate::{
  Error, Result,
  encode::{project, read_rows, to_sql},
  schema::{SCHEMA, TABLES},
};

/// Change notifications buffered per subscriber before it starts lagging.
const CHANGE_CAPACITY: usize = 256;

// ─── Schema introspection ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TableInfo {
  columns:     Vec<String>,
  primary_key: Option<String>,
}

impl TableInfo {
  fn has(&self, column: &str) -> bool { self.columns.iter().any(|c| c == column) }
}

type Tables = HashMap<String, TableInfo>;

/// Reject any identifier the schema does not know. Only identifiers that
/// pass this check are ever interpolated into SQL.
fn check_query(tables: &Tables, query: &Query) -> Result<()> {
  let base = lookup(tables, &query.table)?;
  check_columns(base, &query.table, &query.fields)?;

  for relation in &query.relations {
    let related = lookup(tables, &relation.table)?;
    check_columns(related, &relation.table, &relation.fields)?;
    check_columns(base, &query.table, std::slice::from_ref(&relation.local_key))?;
    check_columns(related, &relation.table, std::slice::from_ref(&relation.foreign_key))?;
  }
  Ok(())
}

fn lookup<'t>(tables: &'t Tables, table: &str) -> Result<&'t TableInfo> {
  tables.get(table).ok_or_else(|| Error::UnknownTable(table.to_owned()))
}

fn check_columns(info: &TableInfo, table: &str, columns: &[String]) -> Result<()> {
  match columns.iter().find(|c| !info.has(c)) {
    Some(column) => Err(Error::UnknownColumn {
      table:  table.to_owned(),
      column: column.clone(),
    }),
    None => Ok(()),
  }
}

// ─── Query execution (runs on the connection thread) ─────────────────────────

fn run_query(conn: &rusqlite::Connection, query: &Query) -> rusqlite::Result<Vec<RawRow>> {
  let mut base = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", query.table))?;
  let base_rows = read_rows(&mut base, [])?;

  let mut related_stmts = query
    .relations
    .iter()
    .map(|r| {
      conn.prepare(&format!(
        "SELECT * FROM {} WHERE {} = ?1 ORDER BY rowid",
        r.table, r.foreign_key
      ))
    })
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut out = Vec::with_capacity(base_rows.len());
  'rows: for row in base_rows {
    let mut projected = project(&row, &query.fields);

    for (relation, stmt) in query.relations.iter().zip(related_stmts.iter_mut()) {
      let related = match row.get(&relation.local_key) {
        None | Some(Value::Null) => Vec::new(),
        Some(key) => read_rows(stmt, rusqlite::params![to_sql(key)])?,
      };
      if relation.required && related.is_empty() {
        continue 'rows;
      }
      projected.insert(relation.name.clone(), embed(relation, related));
    }

    out.push(projected);
  }
  Ok(out)
}

fn embed(relation: &Relation, related: Vec<RawRow>) -> Value {
  let mut objects = related
    .iter()
    .map(|r| Value::Object(project(r, &relation.fields)));
  match relation.cardinality {
    Cardinality::One => objects.next().unwrap_or(Value::Null),
    Cardinality::Many => Value::Array(objects.collect()),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Guardian record store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and the change feed.
#[derive(Clone)]
pub struct SqliteStore {
  conn:            tokio_rusqlite::Connection,
  tables:          Arc<Tables>,
  changes:         broadcast::Sender<Change>,
  require_session: bool,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Reject every read and write from an anonymous [`Session`].
  pub fn requiring_session(mut self, require: bool) -> Self {
    self.require_session = require;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let tables = conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;

        let mut tables = Tables::new();
        for name in TABLES {
          let mut stmt = conn.prepare(&format!("PRAGMA table_info({name})"))?;
          let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          let primary_key = columns.iter().find(|(_, pk)| *pk > 0).map(|(c, _)| c.clone());
          let columns = columns.into_iter().map(|(c, _)| c).collect();
          tables.insert(name.to_owned(), TableInfo { columns, primary_key });
        }
        Ok(tables)
      })
      .await?;

    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Ok(Self {
      conn,
      tables: Arc::new(tables),
      changes,
      require_session: false,
    })
  }

  fn authorize(&self, session: &Session) -> Result<()> {
    if self.require_session && !session.is_authenticated() {
      debug!(request_id = %session.request_id, "anonymous session rejected");
      return Err(Error::Unauthorized);
    }
    Ok(())
  }

  fn notify(&self, table: &str, kind: ChangeKind) {
    // Sending only fails when nobody is subscribed.
    let _ = self.changes.send(Change { table: table.to_owned(), kind });
  }
}

impl QueryStore for SqliteStore {
  type Error = Error;

  async fn execute(&self, session: &Session, query: &Query) -> Result<Vec<RawRow>> {
    self.authorize(session)?;
    check_query(&self.tables, query)?;

    trace!(request_id = %session.request_id, table = %query.table, "select");
    let query = query.clone();
    let rows = self
      .conn
      .call(move |conn| Ok(run_query(conn, &query)?))
      .await?;
    Ok(rows)
  }
}

impl RowWriter for SqliteStore {
  async fn insert(&self, session: &Session, table: &str, row: RawRow) -> Result<()> {
    self.authorize(session)?;
    let info = lookup(&self.tables, table)?;

    let ignored: Vec<&str> =
      row.keys().filter(|c| !info.has(c)).map(String::as_str).collect();
    if !ignored.is_empty() {
      debug!(table, ?ignored, "ignoring unknown columns");
    }

    let (columns, values): (Vec<String>, Vec<SqlValue>) = row
      .iter()
      .filter(|(c, _)| info.has(c))
      .map(|(c, v)| (c.clone(), to_sql(v)))
      .unzip();
    if columns.is_empty() {
      return Err(Error::EmptyRow(table.to_owned()));
    }

    let placeholders = (1..=columns.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let insert_sql = format!(
      "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
      columns.join(", ")
    );
    let existing = info.primary_key.as_ref().and_then(|pk| {
      row
        .get(pk)
        .filter(|v| !v.is_null())
        .map(|v| (format!("SELECT 1 FROM {table} WHERE {pk} = ?1"), to_sql(v)))
    });

    let replaced = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let replaced = match existing {
          Some((sql, key)) => tx
            .query_row(&sql, rusqlite::params![key], |_| Ok(()))
            .optional()?
            .is_some(),
          None => false,
        };
        tx.execute(&insert_sql, rusqlite::params_from_iter(values.iter()))?;
        tx.commit()?;
        Ok(replaced)
      })
      .await?;

    let kind = if replaced { ChangeKind::Update } else { ChangeKind::Insert };
    debug!(request_id = %session.request_id, table, ?kind, "row written");
    self.notify(table, kind);
    Ok(())
  }

  async fn delete(
    &self,
    session: &Session,
    table: &str,
    key: &str,
    value: &Value,
  ) -> Result<usize> {
    self.authorize(session)?;
    let info = lookup(&self.tables, table)?;
    check_columns(info, table, &[key.to_owned()])?;

    let sql = format!("DELETE FROM {table} WHERE {key} = ?1");
    let value = to_sql(value);
    let removed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params![value])?))
      .await?;

    debug!(request_id = %session.request_id, table, removed, "rows deleted");
    if removed > 0 {
      self.notify(table, ChangeKind::Delete);
    }
    Ok(removed)
  }
}

impl ChangeFeed for SqliteStore {
  fn subscribe(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }
}
