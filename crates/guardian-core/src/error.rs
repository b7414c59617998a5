//! Error types for `guardian-core`.
//!
//! Normalization never fails; these cover strict parsing of enum names coming
//! from configuration and request parameters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown event type: {0:?}")]
  UnknownEventType(String),

  #[error("unknown severity: {0:?}")]
  UnknownSeverity(String),

  #[error("unknown entity status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
