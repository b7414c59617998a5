//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | Optional `?text=...&status=active\|inactive\|safe\|alert\|unknown\|all` |
//! | `GET`  | `/entities/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  response::Response,
};
use guardian_core::{
  entity::{Entity, EntityFilter, EntityStatus, EntitySummary},
  load::{LoadState, load_entities},
  store::QueryStore,
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, choice, error::ApiError, respond, session::RequestSession};

/// One filtered page of entities. `summary` always covers every entity, not
/// just the matched ones.
#[derive(Debug, Clone, Serialize)]
pub struct EntityPage {
  pub items:   Vec<Entity>,
  pub matched: usize,
  pub summary: EntitySummary,
}

impl EntityPage {
  pub fn build(entities: &[Entity], filter: &EntityFilter) -> Self {
    let items: Vec<Entity> = filter.apply(entities).cloned().collect();
    Self { matched: items.len(), items, summary: EntitySummary::of(entities) }
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Free text over id, display name and aliases.
  pub text:   Option<String>,
  pub status: Option<String>,
}

/// `GET /entities[?text=...][&status=...]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  RequestSession(session): RequestSession,
  Query(params): Query<ListParams>,
) -> Result<Response, ApiError>
where
  S: QueryStore,
{
  state.authorize(&session)?;
  let status = choice::<EntityStatus>(params.status.as_deref())?;
  let filter = EntityFilter::all()
    .text(params.text.unwrap_or_default())
    .status(status);

  let loaded =
    load_entities(state.store.as_ref(), &session, &state.catalog.entities, &state.context()).await;
  Ok(respond(loaded.map(|entities| EntityPage::build(&entities, &filter))))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/{id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  RequestSession(session): RequestSession,
  Path(id): Path<String>,
) -> Result<Json<Entity>, ApiError>
where
  S: QueryStore,
{
  state.authorize(&session)?;
  let loaded =
    load_entities(state.store.as_ref(), &session, &state.catalog.entities, &state.context()).await;

  let entities = match loaded {
    LoadState::Ready(entities) => entities,
    LoadState::Error { message } => return Err(ApiError::Unavailable(message)),
    LoadState::Empty | LoadState::Loading => Vec::new(),
  };
  entities
    .into_iter()
    .find(|e| e.entity_id == id)
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))
}
