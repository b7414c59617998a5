//! JSON REST API for Guardian.
//!
//! Exposes an axum [`Router`] backed by any store implementing
//! [`RowWriter`]. Reads go through the core load pipeline and are returned as
//! [`LoadState`] bodies; TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", guardian_api::api_router(state))
//! ```

pub mod entities;
pub mod error;
pub mod ingest;
pub mod session;
pub mod timeline;

use std::{str::FromStr, sync::Arc};

use axum::{
  Json, Router,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{delete, get, post},
};
use chrono::Utc;
use guardian_core::{
  catalog::Catalog,
  event::EventType,
  load::LoadState,
  normalize::NormalizeContext,
  session::Session,
  store::RowWriter,
  timeline::Timeline,
};
use serde::Serialize;
use tokio::sync::watch;

pub use error::ApiError;
pub use session::{ACTOR_HEADER, RequestSession};

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:              Arc<S>,
  pub catalog:            Arc<Catalog>,
  /// Substituted for unrecognised `event_type` values.
  pub default_event_type: EventType,
  /// Reject anonymous requests with 401 before touching the store.
  pub require_session:    bool,
  /// When set, `GET /timeline` serves this live state instead of loading.
  pub live_timeline:      Option<watch::Receiver<LoadState<Timeline>>>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:              self.store.clone(),
      catalog:            self.catalog.clone(),
      default_event_type: self.default_event_type,
      require_session:    self.require_session,
      live_timeline:      self.live_timeline.clone(),
    }
  }
}

impl<S> ApiState<S> {
  /// State with the default catalog and no live timeline.
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      catalog: Arc::new(Catalog::default()),
      default_event_type: EventType::default(),
      require_session: false,
      live_timeline: None,
    }
  }

  pub fn with_default_event_type(mut self, event_type: EventType) -> Self {
    self.default_event_type = event_type;
    self
  }

  pub fn requiring_session(mut self, require: bool) -> Self {
    self.require_session = require;
    self
  }

  pub fn with_live_timeline(mut self, rx: watch::Receiver<LoadState<Timeline>>) -> Self {
    self.live_timeline = Some(rx);
    self
  }

  /// A fresh normalization context; `now` is taken per request.
  pub fn context(&self) -> NormalizeContext {
    NormalizeContext::new(Utc::now()).with_default_event_type(self.default_event_type)
  }

  pub(crate) fn authorize(&self, session: &Session) -> Result<(), ApiError> {
    if self.require_session && !session.is_authenticated() {
      return Err(ApiError::Unauthorized);
    }
    Ok(())
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: RowWriter + 'static,
{
  Router::new()
    // Entities
    .route("/entities", get(entities::list::<S>))
    .route("/entities/{id}", get(entities::get_one::<S>))
    // Timeline
    .route("/timeline", get(timeline::list::<S>))
    // Ingestion
    .route("/ingest/{table}", post(ingest::insert::<S>))
    .route("/ingest/{table}/{key}/{value}", delete(ingest::remove::<S>))
    .with_state(state)
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Parse an optional choice parameter. Absent, blank and `all` all mean no
/// restriction.
pub(crate) fn choice<T>(raw: Option<&str>) -> Result<Option<T>, ApiError>
where
  T: FromStr<Err = guardian_core::Error>,
{
  match raw.map(str::trim) {
    None | Some("") => Ok(None),
    Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
    Some(s) => Ok(Some(s.parse()?)),
  }
}

/// Render a load result. A failed load is 503; every other state is 200 and
/// the body says which one it is.
pub(crate) fn respond<T: Serialize>(state: LoadState<T>) -> Response {
  let status = match &state {
    LoadState::Error { .. } => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::OK,
  };
  (status, Json(state)).into_response()
}
