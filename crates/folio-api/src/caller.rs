//! Identifying the caller of a request.
//!
//! Authentication happens in front of this service. The fronting layer sets
//! the `x-folio-user` header to the authenticated user's uuid; requests
//! without it are anonymous. Global admin and super-user flags come from the
//! server's [`Directory`].

use std::collections::HashSet;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use folio_core::{Viewer, store::Store};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

pub const USER_HEADER: &str = "x-folio-user";

/// Users holding global flags.
#[derive(Debug, Clone, Default)]
pub struct Directory {
  pub admins: HashSet<Uuid>,
  pub supers: HashSet<Uuid>,
}

impl Directory {
  pub fn viewer(&self, user_id: Option<Uuid>) -> Viewer {
    let Some(user_id) = user_id else {
      return Viewer::anonymous();
    };
    Viewer {
      user_id:  Some(user_id),
      is_admin: self.admins.contains(&user_id),
      is_super: self.supers.contains(&user_id),
    }
  }
}

/// Read the caller's uuid from `headers`, if one was sent.
pub fn user_id(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
  let Some(value) = headers.get(USER_HEADER) else {
    return Ok(None);
  };
  let value = value
    .to_str()
    .map_err(|_| ApiError::BadRequest(format!("{USER_HEADER} is not valid text")))?;
  Uuid::parse_str(value.trim())
    .map(Some)
    .map_err(|_| ApiError::BadRequest(format!("{USER_HEADER} is not a uuid: {value:?}")))
}

/// The [`Viewer`] a handler acts for.
pub struct Caller(pub Viewer);

impl<S> FromRequestParts<ApiState<S>> for Caller
where
  S: Store + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    let user = user_id(&parts.headers)?;
    Ok(Caller(state.directory.viewer(user)))
  }
}
