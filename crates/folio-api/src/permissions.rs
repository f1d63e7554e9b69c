//! Handlers for `/permissions`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/permissions/:uuid` | Ledger entries; caller needs `admin` |
//! | `PUT`  | `/permissions/:uuid` | Body: `{"level":"edit","users":[...]}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use folio_core::{PermissionEntry, PermissionLevel, store::Store};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, caller::Caller, error::ApiError};

/// `GET /permissions/:uuid`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<Vec<PermissionEntry>>, ApiError>
where
  S: Store + 'static,
{
  let entries = state
    .repo
    .permissions(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceBody {
  pub level: PermissionLevel,
  /// Every user who should hold exactly `level` afterwards.
  pub users: Vec<Uuid>,
}

/// `PUT /permissions/:uuid`
pub async fn replace<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
  Json(body): Json<ReplaceBody>,
) -> Result<StatusCode, ApiError>
where
  S: Store + 'static,
{
  state
    .repo
    .replace_permissions(&viewer, uuid, body.level, body.users)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(StatusCode::NO_CONTENT)
}
