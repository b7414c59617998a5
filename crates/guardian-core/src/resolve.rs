//! Fallback query resolver.
//!
//! A primary query that embeds an optional relation can legitimately return
//! no rows while the base table has data. Callers therefore describe an
//! ordered fallback sequence of [`Descriptor`]s; the resolver tries them one
//! at a time and keeps the first result that is both error-free and
//! non-empty.
//!
//! - A store error halts the sequence and is returned as-is; trying the next
//!   descriptor could mask a systemic failure such as a missing table.
//! - An empty result moves on to the next descriptor.
//! - When every descriptor comes back empty the outcome is
//!   [`Resolution::Empty`], which is not an error.
//! - Cancellation halts the sequence with [`ResolveError::Cancelled`].
//!
//! Descriptors run strictly in sequence; a later one is never started before
//! the earlier one has finished.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  normalize::{Normalize, NormalizeContext, Normalized},
  session::Session,
  store::{Query, QueryStore, RawRow},
};

/// A query paired with the mapping that canonicalises its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor<M> {
  /// Human-readable name used in logs and errors.
  pub label:   String,
  pub query:   Query,
  pub mapping: M,
}

impl<M> Descriptor<M> {
  pub fn new(label: impl Into<String>, query: Query, mapping: M) -> Self {
    Self { label: label.into(), query, mapping }
  }
}

/// The outcome of a resolution that did not fail.
#[derive(Debug)]
pub enum Resolution<'d, M> {
  /// The first descriptor that produced rows.
  Rows {
    descriptor: &'d Descriptor<M>,
    /// Position of `descriptor` in the fallback sequence.
    index:      usize,
    rows:       Vec<RawRow>,
  },
  /// Every descriptor succeeded with zero rows.
  Empty,
}

impl<M> Resolution<'_, M> {
  pub fn is_empty(&self) -> bool { matches!(self, Self::Empty) }

  pub fn rows(&self) -> &[RawRow] {
    match self {
      Self::Rows { rows, .. } => rows,
      Self::Empty => &[],
    }
  }
}

impl<M: Normalize> Resolution<'_, M> {
  /// Canonicalise the rows with the winning descriptor's mapping.
  pub fn normalize(&self, ctx: &NormalizeContext) -> Vec<Normalized<M::Output>> {
    match self {
      Self::Rows { descriptor, rows, .. } => rows
        .iter()
        .map(|row| descriptor.mapping.normalize(row, ctx))
        .collect(),
      Self::Empty => Vec::new(),
    }
  }
}

#[derive(Debug, Error)]
pub enum ResolveError<E>
where
  E: std::error::Error + 'static,
{
  /// The store failed to execute a descriptor's query.
  #[error("query {label:?} failed: {source}")]
  Store {
    label:  String,
    #[source]
    source: E,
  },

  #[error("resolution cancelled")]
  Cancelled,
}

/// Runs fallback sequences against one store on behalf of one session.
pub struct FallbackResolver<'s, S> {
  store:   &'s S,
  session: &'s Session,
}

impl<'s, S: QueryStore> FallbackResolver<'s, S> {
  pub fn new(store: &'s S, session: &'s Session) -> Self {
    Self { store, session }
  }

  /// Try `descriptors` in order; see the module docs for the rules.
  pub async fn resolve<'d, M>(
    &self,
    descriptors: &'d [Descriptor<M>],
  ) -> Result<Resolution<'d, M>, ResolveError<S::Error>> {
    self.resolve_until(descriptors, std::future::pending()).await
  }

  /// Like [`resolve`](Self::resolve), but gives up with
  /// [`ResolveError::Cancelled`] as soon as `cancel` completes. A query in
  /// flight at that moment is dropped.
  pub async fn resolve_until<'d, M, C>(
    &self,
    descriptors: &'d [Descriptor<M>],
    cancel: C,
  ) -> Result<Resolution<'d, M>, ResolveError<S::Error>>
  where
    C: Future<Output = ()>,
  {
    tokio::pin!(cancel);

    for (index, descriptor) in descriptors.iter().enumerate() {
      debug!(
        request_id = %self.session.request_id,
        descriptor = %descriptor.label,
        table = %descriptor.query.table,
        "executing descriptor"
      );

      let outcome = tokio::select! {
        biased;
        () = &mut cancel => None,
        result = self.store.execute(self.session, &descriptor.query) => Some(result),
      };

      let Some(result) = outcome else {
        debug!(descriptor = %descriptor.label, "resolution cancelled");
        return Err(ResolveError::Cancelled);
      };

      let rows = match result {
        Ok(rows) => rows,
        Err(source) => {
          warn!(descriptor = %descriptor.label, error = %source, "descriptor failed");
          return Err(ResolveError::Store { label: descriptor.label.clone(), source });
        }
      };

      if rows.is_empty() {
        debug!(descriptor = %descriptor.label, "no rows; trying next descriptor");
        continue;
      }

      debug!(descriptor = %descriptor.label, rows = rows.len(), "descriptor resolved");
      return Ok(Resolution::Rows { descriptor, index, rows });
    }

    debug!(descriptors = descriptors.len(), "all descriptors empty");
    Ok(Resolution::Empty)
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
  };

  use serde_json::json;

  use super::*;
  use crate::normalize::EntityMapping;

  #[derive(Debug, thiserror::Error)]
  #[error("scripted failure: {0}")]
  struct ScriptedError(String);

  #[derive(Clone)]
  enum Script {
    Rows(usize),
    Fail(&'static str),
    Hang,
  }

  /// Answers each table from a script and records every execution.
  #[derive(Default)]
  struct ScriptedStore {
    scripts:  HashMap<String, Script>,
    executed: Arc<Mutex<Vec<String>>>,
  }

  impl ScriptedStore {
    fn with(mut self, table: &str, script: Script) -> Self {
      self.scripts.insert(table.to_owned(), script);
      self
    }

    fn executed(&self) -> Vec<String> { self.executed.lock().unwrap().clone() }
  }

  impl QueryStore for ScriptedStore {
    type Error = ScriptedError;

    async fn execute(
      &self,
      _session: &Session,
      query: &Query,
    ) -> Result<Vec<RawRow>, ScriptedError> {
      self.executed.lock().unwrap().push(query.table.clone());
      match self.scripts.get(&query.table).cloned().unwrap_or(Script::Rows(0)) {
        Script::Rows(n) => Ok(
          (0..n)
            .map(|i| {
              json!({ "entry_id": format!("{}-{i}", query.table) })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect(),
        ),
        Script::Fail(msg) => Err(ScriptedError(msg.to_owned())),
        Script::Hang => std::future::pending().await,
      }
    }
  }

  fn descriptors(tables: &[&str]) -> Vec<Descriptor<EntityMapping>> {
    tables
      .iter()
      .map(|t| Descriptor::new(*t, Query::table(*t), EntityMapping::default()))
      .collect()
  }

  #[tokio::test]
  async fn primary_with_rows_never_runs_fallback() {
    let store = ScriptedStore::default()
      .with("primary", Script::Rows(2))
      .with("secondary", Script::Rows(5));
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary"]);

    let resolution =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap();

    assert!(matches!(resolution, Resolution::Rows { index: 0, .. }));
    assert_eq!(resolution.rows().len(), 2);
    assert_eq!(store.executed(), vec!["primary"]);
  }

  #[tokio::test]
  async fn empty_primary_falls_back_to_secondary() {
    let store = ScriptedStore::default()
      .with("primary", Script::Rows(0))
      .with("secondary", Script::Rows(3))
      .with("tertiary", Script::Rows(1));
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary", "tertiary"]);

    let resolution =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap();

    match &resolution {
      Resolution::Rows { descriptor, index, rows } => {
        assert_eq!(descriptor.label, "secondary");
        assert_eq!(*index, 1);
        assert_eq!(rows.len(), 3);
      }
      Resolution::Empty => panic!("expected rows"),
    }
    assert_eq!(store.executed(), vec!["primary", "secondary"]);

    let normalized = resolution.normalize(&NormalizeContext::default());
    assert_eq!(normalized[0].value.entity_id, "secondary-0");
  }

  #[tokio::test]
  async fn primary_error_is_surfaced_without_fallback() {
    let store = ScriptedStore::default()
      .with("primary", Script::Fail("no such table"))
      .with("secondary", Script::Rows(3));
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary"]);

    let err =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap_err();

    match err {
      ResolveError::Store { label, source } => {
        assert_eq!(label, "primary");
        assert_eq!(source.0, "no such table");
      }
      ResolveError::Cancelled => panic!("expected store error"),
    }
    assert_eq!(store.executed(), vec!["primary"]);
  }

  #[tokio::test]
  async fn error_after_empty_is_still_an_error() {
    let store = ScriptedStore::default()
      .with("primary", Script::Rows(0))
      .with("secondary", Script::Fail("timeout"));
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary", "tertiary"]);

    let err =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap_err();

    assert!(matches!(err, ResolveError::Store { ref label, .. } if label == "secondary"));
    assert_eq!(store.executed(), vec!["primary", "secondary"]);
  }

  #[tokio::test]
  async fn all_empty_is_a_distinct_outcome() {
    let store = ScriptedStore::default();
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary"]);

    let resolution =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap();

    assert!(resolution.is_empty());
    assert!(resolution.normalize(&NormalizeContext::default()).is_empty());
    assert_eq!(store.executed(), vec!["primary", "secondary"]);
  }

  #[tokio::test]
  async fn no_descriptors_is_empty() {
    let store = ScriptedStore::default();
    let session = Session::anonymous();
    let ds: Vec<Descriptor<EntityMapping>> = Vec::new();

    let resolution =
      FallbackResolver::new(&store, &session).resolve(&ds).await.unwrap();
    assert!(resolution.is_empty());
  }

  #[tokio::test]
  async fn cancellation_interrupts_in_flight_query() {
    let store = ScriptedStore::default()
      .with("primary", Script::Hang)
      .with("secondary", Script::Rows(1));
    let session = Session::anonymous();
    let ds = descriptors(&["primary", "secondary"]);

    let err = FallbackResolver::new(&store, &session)
      .resolve_until(&ds, tokio::time::sleep(Duration::from_millis(20)))
      .await
      .unwrap_err();

    assert!(matches!(err, ResolveError::Cancelled));
    assert_eq!(store.executed(), vec!["primary"]);
  }

  #[tokio::test]
  async fn already_cancelled_runs_nothing() {
    let store = ScriptedStore::default().with("primary", Script::Rows(1));
    let session = Session::anonymous();
    let ds = descriptors(&["primary"]);

    let err = FallbackResolver::new(&store, &session)
      .resolve_until(&ds, std::future::ready(()))
      .await
      .unwrap_err();

    assert!(matches!(err, ResolveError::Cancelled));
    assert!(store.executed().is_empty());
  }
}
