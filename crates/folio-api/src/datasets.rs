//! Dataset-only handlers, merged into the `/datasets` router.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/new_for_template/:template_uuid` | Unsaved dataset input |
//! | `POST` | `/:uuid/publish` | Body: `{"name": ...}`; caller needs `admin` |
//! | `GET`  | `/:uuid/published/:name` | The dataset as published under `name` |
//! | `GET`  | `/:uuid/published/:name/records` | Its records as of that moment |

use axum::{
  Json, Router,
  extract::{Path, State},
  http::StatusCode,
  routing::{get, post},
};
use folio_core::{DatasetInput, DatasetView, RecordView, store::Store};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, caller::Caller, documents::found, error::ApiError};

pub fn routes<S>() -> Router<ApiState<S>>
where
  S: Store + 'static,
{
  Router::new()
    .route("/new_for_template/{template_uuid}", get(new_for_template::<S>))
    .route("/{uuid}/publish", post(publish::<S>))
    .route("/{uuid}/published/{name}", get(published::<S>))
    .route("/{uuid}/published/{name}/records", get(published_records::<S>))
}

/// `GET /new_for_template/:template_uuid`
pub async fn new_for_template<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(template_uuid): Path<Uuid>,
) -> Result<Json<DatasetInput>, ApiError>
where
  S: Store + 'static,
{
  let input = state
    .repo
    .new_dataset_for_template(&viewer, template_uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(input))
}

// ─── Publishing ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PublishBody {
  #[serde(default)]
  pub name: String,
}

/// `POST /:uuid/publish`
pub async fn publish<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
  Json(body): Json<PublishBody>,
) -> Result<StatusCode, ApiError>
where
  S: Store + 'static,
{
  state
    .repo
    .publish_dataset(&viewer, uuid, body.name)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /:uuid/published/:name`
pub async fn published<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path((uuid, name)): Path<(Uuid, String)>,
) -> Result<Json<DatasetView>, ApiError>
where
  S: Store + 'static,
{
  let view = state
    .repo
    .published_dataset(&viewer, uuid, name)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "published version", uuid)
}

/// `GET /:uuid/published/:name/records`
pub async fn published_records<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path((uuid, name)): Path<(Uuid, String)>,
) -> Result<Json<Vec<RecordView>>, ApiError>
where
  S: Store + 'static,
{
  let records = state
    .repo
    .published_records(&viewer, uuid, name)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(records))
}
