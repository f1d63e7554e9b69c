//! JSON REST API for Folio.
//!
//! Exposes an axum [`Router`] backed by any [`folio_core::store::Store`].
//! Authentication, TLS, and transport concerns are the caller's
//! responsibility; see [`caller`] for how the acting user is identified.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", folio_api::api_router(state))
//! ```

pub mod caller;
pub mod datasets;
pub mod documents;
pub mod error;
pub mod fields;
pub mod permissions;
pub mod records;

use std::sync::Arc;

use axum::{Router, routing::get};
use folio_core::{Dataset, Record, Repository, Template, TemplateField, store::Store};

pub use caller::Directory;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub repo:      Arc<Repository<S>>,
  pub directory: Arc<Directory>,
}

impl<S: Store> ApiState<S> {
  pub fn new(store: S, directory: Directory) -> Self {
    Self {
      repo:      Arc::new(Repository::new(store)),
      directory: Arc::new(directory),
    }
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      repo:      Arc::clone(&self.repo),
      directory: Arc::clone(&self.directory),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: Store + 'static,
{
  Router::new()
    .nest("/templates", documents::routes::<S, Template>())
    .nest(
      "/template_fields",
      documents::routes::<S, TemplateField>().merge(fields::routes()),
    )
    .nest(
      "/datasets",
      documents::routes::<S, Dataset>().merge(datasets::routes()),
    )
    .nest(
      "/records",
      documents::routes::<S, Record>().merge(records::routes()),
    )
    .route(
      "/permissions/{uuid}",
      get(permissions::list::<S>).put(permissions::replace::<S>),
    )
    .with_state(state)
}

#[cfg(test)]
mod tests;
