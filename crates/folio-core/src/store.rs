//! The storage seams: [`Txn`] and [`Store`].
//!
//! The engine never talks to a database directly. Every operation runs inside
//! one [`Store::transact`] call and sees the store only through the [`Txn`]
//! handed to it. Backends (e.g. `folio-store-sqlite`) implement both traits.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Result,
  document::{DocumentKind, StoredVersion},
  permission::{PermissionEntry, PermissionLevel},
};

// ─── Transaction ─────────────────────────────────────────────────────────────

/// One atomic unit of work against the document store.
///
/// Writes become visible to later reads on the same `Txn` immediately and to
/// everyone else only once the surrounding [`Store::transact`] commits.
pub trait Txn {
  // ── Versions ──────────────────────────────────────────────────────────

  /// The draft of `uuid`, if one exists.
  fn draft(&self, kind: DocumentKind, uuid: Uuid) -> Result<Option<StoredVersion>>;

  /// The most recently persisted version of `uuid`.
  fn latest_persisted(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
  ) -> Result<Option<StoredVersion>>;

  /// The most recently persisted version of `uuid` with
  /// `persist_date <= at`.
  fn persisted_before(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<StoredVersion>>;

  /// A specific version by its version id, draft or persisted.
  fn version(&self, kind: DocumentKind, id: Uuid) -> Result<Option<StoredVersion>>;

  /// Whether any version of `uuid` exists.
  fn exists(&self, kind: DocumentKind, uuid: Uuid) -> Result<bool>;

  /// Insert `version`, or overwrite the version with the same id.
  ///
  /// Backends must reject a second draft for the same `(kind, uuid)`.
  fn put_version(&self, version: &StoredVersion) -> Result<()>;

  /// Delete the draft of `uuid`. Returns `false` if there was none.
  fn delete_draft(&self, kind: DocumentKind, uuid: Uuid) -> Result<bool>;

  // ── Listings ──────────────────────────────────────────────────────────

  /// Every uuid of `kind`, drafts included, in uuid order.
  fn uuids(&self, kind: DocumentKind) -> Result<Vec<Uuid>>;

  /// Uuids of `kind` whose latest persisted version has a `public_date` at
  /// or before `at`, in uuid order.
  fn public_uuids(&self, kind: DocumentKind, at: DateTime<Utc>) -> Result<Vec<Uuid>>;

  /// Uuids of `kind` on which `user` holds `level` or higher.
  fn permitted_uuids(
    &self,
    kind: DocumentKind,
    user: Uuid,
    level: PermissionLevel,
  ) -> Result<Vec<Uuid>>;

  /// Uuids of every record, drafts included, whose dataset is `dataset`.
  fn records_in_dataset(&self, dataset: Uuid) -> Result<Vec<Uuid>>;

  // ── Permission ledger ─────────────────────────────────────────────────

  fn permission(&self, document: Uuid, user: Uuid)
  -> Result<Option<PermissionLevel>>;

  fn permissions(&self, document: Uuid) -> Result<Vec<PermissionEntry>>;

  /// Upsert the level `user` holds on `document`.
  fn set_permission(
    &self,
    document: Uuid,
    user: Uuid,
    level: PermissionLevel,
  ) -> Result<()>;

  /// Remove every ledger entry for `document`; returns how many there were.
  fn delete_permissions(&self, document: Uuid) -> Result<usize>;

  // ── Publications ──────────────────────────────────────────────────────

  /// When `dataset` was published under `name`.
  fn publication(&self, dataset: Uuid, name: &str) -> Result<Option<DateTime<Utc>>>;

  /// Record a publication. Backends must reject a second one with the same
  /// `(dataset, name)`.
  fn put_publication(&self, dataset: Uuid, name: &str, at: DateTime<Utc>) -> Result<()>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An atomic-transaction-capable document store.
pub trait Store: Send + Sync {
  /// Run `f` in a transaction: committed if `f` returns `Ok`, rolled back
  /// otherwise. The error returned by `f` is passed through unchanged.
  fn transact<F, R>(&self, f: F) -> impl Future<Output = Result<R>> + Send + '_
  where
    F: FnOnce(&dyn Txn) -> Result<R> + Send + 'static,
    R: Send + 'static;
}
