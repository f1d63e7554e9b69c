//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use folio_core::{Error, Viewer};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// The caller must identify themselves first.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("internal error: {0}")]
  Internal(#[source] Error),
}

impl ApiError {
  /// Classify an engine error for `viewer`. A denial is `401` for anonymous
  /// callers and `403` for everyone else.
  pub fn from_core(err: Error, viewer: &Viewer) -> Self {
    match err {
      Error::Input(msg) => Self::BadRequest(msg),
      Error::NotFound(msg) => Self::NotFound(msg),
      Error::PermissionDenied(msg) if viewer.user_id.is_none() => {
        Self::Unauthorized(msg)
      }
      Error::PermissionDenied(msg) => Self::Forbidden(msg),
      err => Self::Internal(err),
    }
  }

  /// Shorthand for `map_err` at call sites.
  pub fn for_viewer(viewer: &Viewer) -> impl FnOnce(Error) -> Self + '_ {
    move |err| Self::from_core(err, viewer)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "internal error while handling request");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn denial_depends_on_who_asked() {
    let anonymous = ApiError::from_core(Error::denied("no"), &Viewer::anonymous());
    assert!(matches!(anonymous, ApiError::Unauthorized(_)));

    let user = Viewer::user(Uuid::new_v4());
    let named = ApiError::from_core(Error::denied("no"), &user);
    assert!(matches!(named, ApiError::Forbidden(_)));
  }

  #[test]
  fn internal_detail_stays_out_of_the_body() {
    let err = ApiError::from_core(Error::Internal("disk on fire".into()), &Viewer::anonymous());
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
