//! Handler for `GET /timeline`.
//!
//! Query params map onto a [`TimelineFilter`]; `event_type` and `severity`
//! accept `all` (or nothing) to mean every value.

use axum::{
  extract::{Query, State},
  response::Response,
};
use guardian_core::{
  event::{EventType, Severity, TimelineEvent},
  load::load_timeline,
  store::QueryStore,
  timeline::{Timeline, TimelineFilter, TimelineSummary},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ApiState, choice, error::ApiError, respond, session::RequestSession};

/// One filtered view of the timeline, newest first. `summary` covers the
/// whole timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePage {
  pub items:   Vec<TimelineEvent>,
  pub matched: usize,
  pub summary: TimelineSummary,
}

impl TimelinePage {
  pub fn build(timeline: &Timeline, filter: &TimelineFilter) -> Self {
    let items: Vec<TimelineEvent> = timeline.view(filter).cloned().collect();
    Self { matched: items.len(), items, summary: timeline.summary() }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
  pub event_type: Option<String>,
  pub severity:   Option<String>,
  /// Free text over details, actor name and actor id.
  pub text:       Option<String>,
}

/// `GET /timeline[?event_type=...][&severity=...][&text=...]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  RequestSession(session): RequestSession,
  Query(params): Query<TimelineParams>,
) -> Result<Response, ApiError>
where
  S: QueryStore,
{
  state.authorize(&session)?;
  let filter = TimelineFilter::all()
    .event_type(choice::<EventType>(params.event_type.as_deref())?)
    .severity(choice::<Severity>(params.severity.as_deref())?)
    .text(params.text.unwrap_or_default());

  let loaded = match &state.live_timeline {
    Some(live) => {
      debug!(request_id = %session.request_id, "serving live timeline");
      live.borrow().clone()
    }
    None => {
      let sources = &state.catalog.event_sources;
      load_timeline(state.store.as_ref(), &session, sources, &state.context()).await
    }
  };
  Ok(respond(loaded.map(|timeline| TimelinePage::build(&timeline, &filter))))
}
