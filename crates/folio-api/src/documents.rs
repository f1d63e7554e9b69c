//! Handlers shared by every document kind.
//!
//! Mounted once per kind under `/templates`, `/template_fields`, `/datasets`
//! and `/records`:
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/` | Body: nested input; returns 201 + `{"uuid"}` |
//! | `PUT`    | `/:uuid` | Body: nested input |
//! | `GET`    | `/:uuid` | Latest persisted version |
//! | `GET`    | `/:uuid/:timestamp` | Latest version persisted at or before an RFC 3339 timestamp |
//! | `GET`    | `/:uuid/draft` | 404 if there is nothing to show |
//! | `DELETE` | `/:uuid/draft` | |
//! | `GET`    | `/:uuid/draft_existing` | `true` / `false` |
//! | `GET`    | `/:uuid/last_update` | Concurrency token for persist |
//! | `POST`   | `/:uuid/persist` | Body: `{"last_update": ...}` |
//! | `POST`   | `/:uuid/duplicate` | Returns 201 + `{"uuid"}` of the copy |
//! | `GET`    | `/persisted_version/:id` | One persisted version by version id |
//! | `GET`    | `/all_public_uuids` | Uuids whose latest persisted version is public |
//! | `GET`    | `/all_viewable_uuids` | Public uuids plus those the caller may view |

use axum::{
  Json, Router,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
};
use chrono::{DateTime, Utc};
use folio_core::{Document, store::Store};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{ApiState, caller::Caller, error::ApiError};

/// Routes for document kind `D`, to be nested under its collection path.
pub fn routes<S, D>() -> Router<ApiState<S>>
where
  S: Store + 'static,
  D: Document + 'static,
{
  Router::new()
    .route("/", post(create::<S, D>))
    .route("/{uuid}", get(latest::<S, D>).put(update::<S, D>))
    .route("/{uuid}/draft", get(draft::<S, D>).delete(delete_draft::<S, D>))
    .route("/{uuid}/draft_existing", get(draft_existing::<S, D>))
    .route("/{uuid}/last_update", get(last_update::<S, D>))
    .route("/{uuid}/persist", post(persist::<S, D>))
    .route("/{uuid}/duplicate", post(duplicate::<S, D>))
    .route("/{uuid}/{timestamp}", get(persisted_before::<S, D>))
    .route("/persisted_version/{id}", get(persisted_version::<S, D>))
    .route("/all_public_uuids", get(all_public_uuids::<S, D>))
    .route("/all_viewable_uuids", get(all_viewable_uuids::<S, D>))
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// `POST /`
pub async fn create<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Json(input): Json<D::Input>,
) -> Result<impl IntoResponse, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let uuid = state
    .repo
    .create::<D>(&viewer, input)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok((StatusCode::CREATED, Json(json!({ "uuid": uuid }))))
}

/// `PUT /:uuid`
pub async fn update<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
  Json(input): Json<D::Input>,
) -> Result<StatusCode, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  state
    .repo
    .update::<D>(&viewer, uuid, input)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /:uuid/draft`
pub async fn delete_draft<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  state
    .repo
    .draft_delete::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PersistBody {
  pub last_update: DateTime<Utc>,
}

/// `POST /:uuid/persist`, body: `{"last_update":"<rfc3339>"}`
pub async fn persist<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
  Json(body): Json<PersistBody>,
) -> Result<StatusCode, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  state
    .repo
    .persist::<D>(&viewer, uuid, body.last_update)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /:uuid/duplicate`
pub async fn duplicate<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let copy = state
    .repo
    .duplicate::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok((StatusCode::CREATED, Json(json!({ "uuid": copy }))))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub(crate) fn found<T>(view: Option<T>, what: &str, uuid: Uuid) -> Result<Json<T>, ApiError> {
  view
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("no {what} for {uuid}")))
}

/// `GET /:uuid/draft`
pub async fn draft<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<D::View>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let view = state
    .repo
    .draft_get::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "draft", uuid)
}

/// `GET /:uuid/draft_existing`
pub async fn draft_existing<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<bool>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let exists = state
    .repo
    .draft_existing::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(exists))
}

/// `GET /:uuid/last_update`
pub async fn last_update<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<DateTime<Utc>>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let at = state
    .repo
    .last_update::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(at))
}

/// `GET /:uuid`
pub async fn latest<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(uuid): Path<Uuid>,
) -> Result<Json<D::View>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let view = state
    .repo
    .latest_persisted::<D>(&viewer, uuid)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "persisted version", uuid)
}

/// `GET /:uuid/:timestamp`
pub async fn persisted_before<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path((uuid, timestamp)): Path<(Uuid, String)>,
) -> Result<Json<D::View>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let at = DateTime::parse_from_rfc3339(&timestamp)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| ApiError::BadRequest(format!("invalid timestamp {timestamp:?}: {e}")))?;
  let view = state
    .repo
    .persisted_before::<D>(&viewer, uuid, at)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "version persisted before the given time", uuid)
}

/// `GET /persisted_version/:id`
pub async fn persisted_version<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<D::View>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let view = state
    .repo
    .persisted_version::<D>(&viewer, id)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  found(view, "persisted version", id)
}

// ─── Listings ────────────────────────────────────────────────────────────────

/// `GET /all_public_uuids`
pub async fn all_public_uuids<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
) -> Result<Json<Vec<Uuid>>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let uuids = state
    .repo
    .all_public_uuids::<D>(&viewer)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(uuids))
}

/// `GET /all_viewable_uuids`
pub async fn all_viewable_uuids<S, D>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
) -> Result<Json<Vec<Uuid>>, ApiError>
where
  S: Store + 'static,
  D: Document,
{
  let uuids = state
    .repo
    .all_viewable_uuids::<D>(&viewer)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(uuids))
}
