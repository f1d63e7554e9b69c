//! Error types for `folio-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed request, schema mismatch, stale concurrency token, cyclic or
  /// duplicated reference.
  #[error("invalid input: {0}")]
  Input(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  /// An invariant the engine relies on did not hold.
  #[error("internal error: {0}")]
  Internal(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn input(msg: impl Into<String>) -> Self { Self::Input(msg.into()) }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::NotFound(msg.into())
  }

  pub fn denied(msg: impl Into<String>) -> Self {
    Self::PermissionDenied(msg.into())
  }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn is_denied(&self) -> bool { matches!(self, Self::PermissionDenied(_)) }

  /// `true` for the two outcomes that child resolution treats as "cannot
  /// touch this child" rather than a failure of the whole call.
  pub fn is_unreachable(&self) -> bool {
    self.is_not_found() || self.is_denied()
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
