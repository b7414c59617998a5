//! Handlers for `/ingest` endpoints: raw rows in, raw rows out.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/ingest/{table}` | Body: one JSON object; unknown columns are ignored; 201 |
//! | `DELETE` | `/ingest/{table}/{key}/{value}` | 204, or 404 if nothing matched |
//!
//! Only tables the catalog reads from are writable.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use guardian_core::store::RowWriter;
use serde_json::Value;
use tracing::info;

use crate::{ApiState, error::ApiError, session::RequestSession};

fn writable<S>(state: &ApiState<S>, table: &str) -> Result<(), ApiError> {
  if state.catalog.tables().contains(table) {
    Ok(())
  } else {
    Err(ApiError::NotFound(format!("table {table} not found")))
  }
}

/// `POST /ingest/{table}`
pub async fn insert<S>(
  State(state): State<ApiState<S>>,
  RequestSession(session): RequestSession,
  Path(table): Path<String>,
  Json(body): Json<Value>,
) -> Result<StatusCode, ApiError>
where
  S: RowWriter,
{
  state.authorize(&session)?;
  writable(&state, &table)?;
  let Value::Object(row) = body else {
    return Err(ApiError::BadRequest("body must be a JSON object".into()));
  };

  state
    .store
    .insert(&session, &table, row)
    .await
    .map_err(ApiError::store)?;
  info!(request_id = %session.request_id, actor = ?session.actor, %table, "row ingested");
  Ok(StatusCode::CREATED)
}

/// `DELETE /ingest/{table}/{key}/{value}`
pub async fn remove<S>(
  State(state): State<ApiState<S>>,
  RequestSession(session): RequestSession,
  Path((table, key, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError>
where
  S: RowWriter,
{
  state.authorize(&session)?;
  writable(&state, &table)?;

  let removed = state
    .store
    .delete(&session, &table, &key, &Value::String(value.clone()))
    .await
    .map_err(ApiError::store)?;
  if removed == 0 {
    return Err(ApiError::NotFound(format!("no {table} row with {key} = {value}")));
  }
  info!(request_id = %session.request_id, actor = ?session.actor, %table, removed, "rows deleted");
  Ok(StatusCode::NO_CONTENT)
}
