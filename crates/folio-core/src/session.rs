//! [`Session`]: the explicit transaction handle threaded through the engine.
//!
//! Only [`Repository`](crate::repository::Repository) opens a session. Every
//! engine function takes `&mut Session` and hands the same session to the
//! functions it recurses into, whatever their document kind, so a whole
//! resolve or persist cascade shares one atomic scope.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Result,
  document::{Body, DocumentKind, StoredVersion, Version, truncate_millis},
  permission::{PermissionLevel, Viewer},
  store::Txn,
};

pub struct Session<'t> {
  tx:     &'t dyn Txn,
  viewer: Viewer,
  now:    DateTime<Utc>,
  /// `(document, level, public counts)` → outcome, for this request only.
  access: HashMap<(Uuid, PermissionLevel, bool), bool>,
}

impl<'t> Session<'t> {
  pub fn new(tx: &'t dyn Txn, viewer: Viewer) -> Self {
    Self {
      tx,
      viewer,
      now: truncate_millis(Utc::now()),
      access: HashMap::new(),
    }
  }

  pub fn viewer(&self) -> &Viewer { &self.viewer }

  /// The request timestamp. Every version written in this session carries it.
  pub fn now(&self) -> DateTime<Utc> { self.now }

  pub(crate) fn txn(&self) -> &'t dyn Txn { self.tx }

  // ── Access memo ───────────────────────────────────────────────────────

  pub(crate) fn remembered(
    &self,
    uuid: Uuid,
    level: PermissionLevel,
    public: bool,
  ) -> Option<bool> {
    self.access.get(&(uuid, level, public)).copied()
  }

  pub(crate) fn remember(
    &mut self,
    uuid: Uuid,
    level: PermissionLevel,
    public: bool,
    outcome: bool,
  ) {
    self.access.insert((uuid, level, public), outcome);
  }

  pub(crate) fn forget_access(&mut self) { self.access.clear(); }

  // ── Typed reads ───────────────────────────────────────────────────────

  pub fn draft<B: Body>(&self, uuid: Uuid) -> Result<Option<Version<B>>> {
    self.tx.draft(B::KIND, uuid)?.map(Version::decode).transpose()
  }

  pub fn latest_persisted<B: Body>(
    &self,
    uuid: Uuid,
  ) -> Result<Option<Version<B>>> {
    self
      .tx
      .latest_persisted(B::KIND, uuid)?
      .map(Version::decode)
      .transpose()
  }

  pub fn persisted_before<B: Body>(
    &self,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<Version<B>>> {
    self
      .tx
      .persisted_before(B::KIND, uuid, at)?
      .map(Version::decode)
      .transpose()
  }

  pub fn version<B: Body>(&self, id: Uuid) -> Result<Option<Version<B>>> {
    self.tx.version(B::KIND, id)?.map(Version::decode).transpose()
  }

  /// The draft if there is one, otherwise the latest persisted version.
  pub fn latest_document<B: Body>(
    &self,
    uuid: Uuid,
  ) -> Result<Option<Version<B>>> {
    match self.draft::<B>(uuid)? {
      Some(draft) => Ok(Some(draft)),
      None => self.latest_persisted::<B>(uuid),
    }
  }

  pub fn exists(&self, kind: DocumentKind, uuid: Uuid) -> Result<bool> {
    self.tx.exists(kind, uuid)
  }

  pub fn has_draft(&self, kind: DocumentKind, uuid: Uuid) -> Result<bool> {
    Ok(self.tx.draft(kind, uuid)?.is_some())
  }

  pub fn uuid_for_version(
    &self,
    kind: DocumentKind,
    id: Uuid,
  ) -> Result<Option<Uuid>> {
    Ok(self.tx.version(kind, id)?.map(|v| v.uuid))
  }

  pub fn latest_persisted_meta(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
  ) -> Result<Option<StoredVersion>> {
    self.tx.latest_persisted(kind, uuid)
  }

  pub fn latest_persist_date(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
  ) -> Result<Option<DateTime<Utc>>> {
    Ok(
      self
        .tx
        .latest_persisted(kind, uuid)?
        .and_then(|v| v.persist_date),
    )
  }

  /// Map persisted version ids back to document uuids, dropping (and
  /// logging) ids that no longer resolve.
  pub fn uuids_for_versions(
    &self,
    kind: DocumentKind,
    owner: Uuid,
    ids: &[Uuid],
  ) -> Result<Vec<Uuid>> {
    let mut uuids = Vec::with_capacity(ids.len());
    for id in ids {
      match self.uuid_for_version(kind, *id)? {
        Some(uuid) => uuids.push(uuid),
        None => tracing::warn!(
          %owner, version_id = %id, %kind,
          "dropping reference to a version that no longer exists"
        ),
      }
    }
    Ok(uuids)
  }

  /// Uuids of every record filed under `dataset`, drafts included.
  pub fn records_in_dataset(&self, dataset: Uuid) -> Result<Vec<Uuid>> {
    self.tx.records_in_dataset(dataset)
  }

  pub fn publication(&self, dataset: Uuid, name: &str) -> Result<Option<DateTime<Utc>>> {
    self.tx.publication(dataset, name)
  }

  // ── Typed writes ──────────────────────────────────────────────────────

  /// Write `body` as the draft of `uuid`, reusing the current draft's
  /// version id if there is one. `updated_at` becomes the request time.
  pub fn upsert_draft<B: Body>(&self, uuid: Uuid, body: B) -> Result<Version<B>> {
    let id = self
      .tx
      .draft(B::KIND, uuid)?
      .map(|d| d.id)
      .unwrap_or_else(Uuid::new_v4);
    let version = Version {
      id,
      uuid,
      updated_at: self.now,
      persist_date: None,
      body,
    };
    self.tx.put_version(&version.encode()?)?;
    Ok(version)
  }

  pub fn delete_draft(&self, kind: DocumentKind, uuid: Uuid) -> Result<bool> {
    self.tx.delete_draft(kind, uuid)
  }

  pub fn put_publication(&self, dataset: Uuid, name: &str, at: DateTime<Utc>) -> Result<()> {
    self.tx.put_publication(dataset, name, at)
  }

  /// Freeze `draft` with `body` as its final content. `persist_date` and
  /// `updated_at` both become the request time, shared by every version the
  /// cascade persists.
  pub fn mark_persisted<B: Body>(
    &self,
    draft: Version<B>,
    body: B,
  ) -> Result<Version<B>> {
    let version = Version {
      id: draft.id,
      uuid: draft.uuid,
      updated_at: self.now,
      persist_date: Some(self.now),
      body,
    };
    self.tx.put_version(&version.encode()?)?;
    tracing::debug!(kind = %B::KIND, uuid = %version.uuid, id = %version.id, "persisted");
    Ok(version)
  }
}
