//! Explicit session context handed to stores.
//!
//! The store never looks up "the current user" on its own; callers pass the
//! session they hold for the request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is asking, and under which request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  /// Correlates log lines for one request or recomputation.
  pub request_id: Uuid,
  /// The authenticated actor, if any.
  pub actor:      Option<String>,
}

impl Session {
  pub fn anonymous() -> Self {
    Self { request_id: Uuid::new_v4(), actor: None }
  }

  pub fn for_actor(actor: impl Into<String>) -> Self {
    let actor = actor.into();
    let actor = (!actor.trim().is_empty()).then_some(actor);
    Self { request_id: Uuid::new_v4(), actor }
  }

  pub fn is_authenticated(&self) -> bool { self.actor.is_some() }
}

impl Default for Session {
  fn default() -> Self { Self::anonymous() }
}
