//! Per-request [`Session`] extraction.
//!
//! The acting identity comes from the `x-guardian-actor` header and nowhere
//! else. A missing, blank or non-UTF-8 header yields an anonymous session;
//! whether that is acceptable is decided by the handler.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use guardian_core::session::Session;

pub const ACTOR_HEADER: &str = "x-guardian-actor";

/// Extractor wrapping the request's [`Session`].
#[derive(Debug, Clone)]
pub struct RequestSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for RequestSession {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let session = parts
      .headers
      .get(ACTOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map_or_else(Session::anonymous, Session::for_actor);
    Ok(Self(session))
  }
}
