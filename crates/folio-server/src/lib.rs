//! HTTP server assembly for Folio.
//!
//! Loads [`ServerConfig`], wires a store into [`folio_api::api_router`], and
//! wraps the router in request tracing.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use axum::Router;
use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use folio_api::{ApiState, Directory};
use folio_core::store::Store;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `FOLIO_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// Users holding the global admin flag.
  #[serde(default)]
  pub admins:     Vec<Uuid>,
  /// Users holding the global super-user flag.
  #[serde(default)]
  pub supers:     Vec<Uuid>,
}

impl ServerConfig {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_builder(
      Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
          Environment::with_prefix("FOLIO")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("admins")
            .with_list_parse_key("supers"),
        ),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<DefaultState>,
  ) -> Result<Self, ConfigError> {
    builder
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "folio.db")?
      .build()?
      .try_deserialize()
  }

  pub fn directory(&self) -> Directory {
    Directory {
      admins: self.admins.iter().copied().collect::<HashSet<_>>(),
      supers: self.supers.iter().copied().collect::<HashSet<_>>(),
    }
  }

  /// `store_path` with a leading `~` expanded to the user's home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The complete application: API routes plus request tracing.
pub fn app<S>(store: S, config: &ServerConfig) -> Router
where
  S: Store + 'static,
{
  folio_api::api_router(ApiState::new(store, config.directory()))
    .layer(TraceLayer::new_for_http())
}
