//! [`Repository`]: the async entry point over a [`Store`].
//!
//! Each method opens exactly one transaction and one [`Session`], so every
//! operation, including the whole of a nested resolve or persist cascade,
//! either commits entirely or not at all.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Result,
  dataset::{self, DatasetInput, DatasetView},
  field::{self, FieldView},
  lifecycle::Document,
  permission::{PermissionEntry, PermissionLevel, Viewer},
  record::{self, RecordView},
  session::Session,
  store::Store,
};

#[derive(Debug, Clone)]
pub struct Repository<S> {
  store: S,
}

impl<S: Store> Repository<S> {
  pub fn new(store: S) -> Self { Self { store } }

  pub fn store(&self) -> &S { &self.store }

  /// Run `f` inside one transaction on behalf of `viewer`.
  pub async fn run<R, F>(&self, viewer: &Viewer, f: F) -> Result<R>
  where
    F: FnOnce(&mut Session<'_>) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let viewer = viewer.clone();
    self
      .store
      .transact(move |tx| f(&mut Session::new(tx, viewer)))
      .await
  }

  // ── Document operations ───────────────────────────────────────────────

  pub async fn create<D: Document>(
    &self,
    viewer: &Viewer,
    input: D::Input,
  ) -> Result<Uuid> {
    self.run(viewer, move |s| D::create(s, input)).await
  }

  pub async fn update<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    input: D::Input,
  ) -> Result<()> {
    self.run(viewer, move |s| D::update(s, uuid, input)).await
  }

  pub async fn draft_get<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<Option<D::View>> {
    self.run(viewer, move |s| D::draft_get(s, uuid)).await
  }

  pub async fn draft_existing<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<bool> {
    self.run(viewer, move |s| D::draft_existing(s, uuid)).await
  }

  pub async fn draft_delete<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<()> {
    self.run(viewer, move |s| D::draft_delete(s, uuid)).await
  }

  pub async fn persist<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()> {
    self
      .run(viewer, move |s| D::persist(s, uuid, last_update))
      .await
  }

  pub async fn latest_persisted<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<Option<D::View>> {
    self.run(viewer, move |s| D::latest_persisted(s, uuid)).await
  }

  pub async fn persisted_before<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<D::View>> {
    self
      .run(viewer, move |s| D::persisted_before(s, uuid, at))
      .await
  }

  pub async fn persisted_version<D: Document>(
    &self,
    viewer: &Viewer,
    id: Uuid,
  ) -> Result<Option<D::View>> {
    self.run(viewer, move |s| D::persisted_version(s, id)).await
  }

  pub async fn last_update<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<DateTime<Utc>> {
    self.run(viewer, move |s| D::last_update(s, uuid)).await
  }

  pub async fn duplicate<D: Document>(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<Uuid> {
    self.run(viewer, move |s| D::duplicate(s, uuid)).await
  }

  pub async fn all_public_uuids<D: Document>(&self, viewer: &Viewer) -> Result<Vec<Uuid>> {
    self.run(viewer, D::all_public_uuids).await
  }

  pub async fn all_viewable_uuids<D: Document>(
    &self,
    viewer: &Viewer,
  ) -> Result<Vec<Uuid>> {
    self.run(viewer, D::all_viewable_uuids).await
  }

  // ── Template fields ───────────────────────────────────────────────────

  pub async fn all_public_fields(&self, viewer: &Viewer) -> Result<Vec<FieldView>> {
    self.run(viewer, field::all_public_fields).await
  }

  // ── Datasets ──────────────────────────────────────────────────────────

  pub async fn new_dataset_for_template(
    &self,
    viewer: &Viewer,
    template_uuid: Uuid,
  ) -> Result<DatasetInput> {
    self
      .run(viewer, move |s| dataset::new_for_template(s, template_uuid))
      .await
  }

  pub async fn publish_dataset(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    name: String,
  ) -> Result<()> {
    self
      .run(viewer, move |s| dataset::publish(s, uuid, &name))
      .await
  }

  pub async fn published_dataset(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    name: String,
  ) -> Result<Option<DatasetView>> {
    self
      .run(viewer, move |s| dataset::published(s, uuid, &name))
      .await
  }

  pub async fn published_records(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
    name: String,
  ) -> Result<Vec<RecordView>> {
    self
      .run(viewer, move |s| dataset::published_records(s, uuid, &name))
      .await
  }

  // ── Records ───────────────────────────────────────────────────────────

  pub async fn new_record_draft_from_latest_persisted(
    &self,
    viewer: &Viewer,
    uuid: Uuid,
  ) -> Result<Option<RecordView>> {
    self
      .run(viewer, move |s| record::new_draft_from_latest_persisted(s, uuid))
      .await
  }

  // ── Permissions ───────────────────────────────────────────────────────

  pub async fn permissions(
    &self,
    viewer: &Viewer,
    document: Uuid,
  ) -> Result<Vec<PermissionEntry>> {
    self.run(viewer, move |s| s.list_permissions(document)).await
  }

  pub async fn replace_permissions(
    &self,
    viewer: &Viewer,
    document: Uuid,
    level: PermissionLevel,
    users: Vec<Uuid>,
  ) -> Result<()> {
    self
      .run(viewer, move |s| s.replace_permissions(document, level, &users))
      .await
  }
}
