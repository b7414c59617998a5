//! HTTP server wiring for Guardian.
//!
//! Owns the runtime configuration, the top-level router (API, health check,
//! request tracing) and the optional live timeline that keeps `GET
//! /api/timeline` current without a per-request load.

use std::{path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use chrono::Utc;
use guardian_api::{ApiState, api_router};
use guardian_core::{
  catalog::Catalog,
  event::EventType,
  live::LiveView,
  load::load_timeline,
  normalize::NormalizeContext,
  session::Session,
  store::{ChangeFeed, QueryStore, RowWriter},
  timeline::Timeline,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Actor recorded for the server's own background reads.
pub const SERVER_ACTOR: &str = "guardian-server";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `GUARDIAN_*` environment variables. Every key is optional.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub default_event_type: EventType,
  pub require_session:    bool,
  pub live_timeline:      bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8080,
      store_path:         PathBuf::from("guardian.db"),
      default_event_type: EventType::default(),
      require_session:    false,
      live_timeline:      true,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The complete application: the API under `/api` plus `/health`, with
/// request tracing on every route.
pub fn router<S>(state: ApiState<S>) -> Router
where
  S: RowWriter + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Live timeline ───────────────────────────────────────────────────────────

/// Start a timeline view that recomputes whenever a catalog table changes.
/// The view stops when the returned handle is dropped.
pub fn spawn_live_timeline<S>(
  store: Arc<S>,
  catalog: Arc<Catalog>,
  default_event_type: EventType,
) -> LiveView<Timeline>
where
  S: QueryStore + ChangeFeed + 'static,
{
  let changes = store.subscribe();
  let tables = catalog.tables();
  let session = Session::for_actor(SERVER_ACTOR);

  LiveView::spawn(changes, tables, move || {
    let store = store.clone();
    let catalog = catalog.clone();
    let session = session.clone();
    async move {
      let ctx = NormalizeContext::new(Utc::now()).with_default_event_type(default_event_type);
      load_timeline(store.as_ref(), &session, &catalog.event_sources, &ctx).await
    }
  })
}
