//! Record-only handlers, merged into the `/records` router.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/:uuid/new_draft_from_latest_persisted` | Ignores any current draft |

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::get,
};
use folio_core::{RecordView, store::Store};
use uuid::Uuid;

use crate::{ApiState, caller::Caller, documents::found, error::ApiError};

pub fn routes<S>() -> Router<ApiState<S>>
where
  S: Store + 'static,
{
  Router::new().route(
    "/{uuid}/new_draft_from_latest_persisted",
    get(new_draft_from_latest_persisted::<S>),
  )
}

/// `GET /:uuid/new_draft_from_latest_persisted`
pub async fn new_draft_from_latest_persisted<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<RecordView>, ApiError>
where
  S: Store + 'static,
{
  let view = state
    .repo
    .new_record_draft_from_latest_persisted(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "persisted version", uuid)
}
