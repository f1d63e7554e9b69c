//! Template-field-only handlers, merged into the `/template_fields` router.

use axum::{Json, Router, extract::State, routing::get};
use folio_core::{FieldView, store::Store};

use crate::{ApiState, caller::Caller, error::ApiError};

pub fn routes<S>() -> Router<ApiState<S>>
where
  S: Store + 'static,
{
  Router::new().route("/all_public_fields", get(all_public_fields::<S>))
}

/// `GET /all_public_fields`: the latest persisted version of every public
/// field.
pub async fn all_public_fields<S>(
  State(state): State<ApiState<S>>,
  Caller(viewer): Caller,
) -> Result<Json<Vec<FieldView>>, ApiError>
where
  S: Store + 'static,
{
  let fields = state
    .repo
    .all_public_fields(&viewer)
    .await
    .map_err(ApiError::for_viewer(&viewer))?;
  Ok(Json(fields))
}
