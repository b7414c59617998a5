//! End-to-end passes: resolve → normalize → merge, reported as a
//! [`LoadState`] that consumers can render without re-deriving anything.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  catalog::EventSource,
  entity::Entity,
  normalize::{EntityMapping, NormalizeContext, Normalized},
  resolve::{Descriptor, FallbackResolver, Resolution},
  session::Session,
  store::QueryStore,
  timeline::Timeline,
};

/// What a consumer shows. `Error` (something broke) and `Empty` (nothing
/// there yet) are deliberately separate states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum LoadState<T> {
  Loading,
  Error { message: String },
  Empty,
  Ready(T),
}

impl<T> LoadState<T> {
  pub fn is_ready(&self) -> bool { matches!(self, Self::Ready(_)) }

  pub fn ready(&self) -> Option<&T> {
    match self {
      Self::Ready(data) => Some(data),
      _ => None,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadState<U> {
    match self {
      Self::Loading => LoadState::Loading,
      Self::Error { message } => LoadState::Error { message },
      Self::Empty => LoadState::Empty,
      Self::Ready(data) => LoadState::Ready(f(data)),
    }
  }
}

fn log_defaults<T>(kind: &str, normalized: &[Normalized<T>]) {
  let defaulted = normalized.iter().filter(|n| !n.is_complete()).count();
  if defaulted > 0 {
    debug!(kind, rows = normalized.len(), defaulted, "rows normalized with defaults");
  }
}

/// Resolve and normalize entities.
pub async fn load_entities<S: QueryStore>(
  store: &S,
  session: &Session,
  descriptors: &[Descriptor<EntityMapping>],
  ctx: &NormalizeContext,
) -> LoadState<Vec<Entity>> {
  let resolver = FallbackResolver::new(store, session);
  match resolver.resolve(descriptors).await {
    Err(e) => {
      warn!(request_id = %session.request_id, error = %e, "entity load failed");
      LoadState::Error { message: e.to_string() }
    }
    Ok(Resolution::Empty) => LoadState::Empty,
    Ok(resolution) => {
      let normalized = resolution.normalize(ctx);
      log_defaults("entity", &normalized);
      info!(request_id = %session.request_id, entities = normalized.len(), "entities loaded");
      LoadState::Ready(normalized.into_iter().map(Normalized::into_value).collect())
    }
  }
}

/// Resolve every event source in turn and merge the results.
///
/// Any source failing fails the whole load; sources that come back empty
/// simply contribute nothing. If every source is empty the result is
/// [`LoadState::Empty`].
pub async fn load_timeline<S: QueryStore>(
  store: &S,
  session: &Session,
  sources: &[EventSource],
  ctx: &NormalizeContext,
) -> LoadState<Timeline> {
  let resolver = FallbackResolver::new(store, session);
  let mut merged = Vec::with_capacity(sources.len());

  for source in sources {
    match resolver.resolve(&source.descriptors).await {
      Err(e) => {
        warn!(request_id = %session.request_id, source = %source.name, error = %e, "event load failed");
        return LoadState::Error { message: e.to_string() };
      }
      Ok(Resolution::Empty) => {
        debug!(source = %source.name, "event source empty");
      }
      Ok(resolution) => {
        let normalized = resolution.normalize(ctx);
        log_defaults("event", &normalized);
        merged.push(normalized.into_iter().map(Normalized::into_value).collect::<Vec<_>>());
      }
    }
  }

  let timeline = Timeline::merge(merged);
  if timeline.is_empty() {
    return LoadState::Empty;
  }
  info!(request_id = %session.request_id, events = timeline.len(), "timeline loaded");
  LoadState::Ready(timeline)
}
