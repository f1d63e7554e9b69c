//! Datasets: instances bound to one persisted template version.
//!
//! A dataset's `related_datasets` mirror the slots of its template: each
//! related or subscribed template version must be filled by exactly one
//! related dataset bound to that version. Datasets created together in one
//! request share a `group_uuid`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{Body, DocumentKind, Version, same_set},
  field::dates_equal,
  lifecycle::{self, Document, Resolved},
  permission::PermissionLevel,
  projection::{self, Linked},
  record::{Record, RecordView},
  session::Session,
  template::Template,
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  /// A persisted template version id.
  pub template_id:      Uuid,
  pub group_uuid:       Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:      Option<DateTime<Utc>>,
  /// Dataset uuids in a draft, version ids once persisted.
  #[serde(default)]
  pub related_datasets: Vec<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from:  Option<Uuid>,
}

impl Body for Dataset {
  const KIND: DocumentKind = DocumentKind::Dataset;

  fn public_date(&self) -> Option<DateTime<Utc>> { self.public_date }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:             Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template_id:      Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:      Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub related_datasets: Option<Vec<DatasetInput>>,
}

impl DatasetInput {
  pub fn reference(uuid: Uuid) -> Self {
    Self { uuid: Some(uuid), ..Self::default() }
  }

  /// Linking an existing dataset may still name its template version.
  pub fn referenced_uuid(&self) -> Option<Uuid> {
    let bare = self.public_date.is_none() && self.related_datasets.is_none();
    self.uuid.filter(|_| bare)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetView {
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id:               Option<Uuid>,
  pub uuid:             Uuid,
  pub updated_at:       DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub persist_date:     Option<DateTime<Utc>>,
  pub template_id:      Uuid,
  pub group_uuid:       Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:      Option<DateTime<Utc>>,
  pub related_datasets: Vec<Linked<DatasetView>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from:  Option<Uuid>,
}

impl DatasetView {
  fn shell(version: &Version<Dataset>, persisted: bool) -> Self {
    Self {
      id:               persisted.then_some(version.id),
      uuid:             version.uuid,
      updated_at:       version.updated_at,
      persist_date:     if persisted { version.persist_date } else { None },
      template_id:      version.body.template_id,
      group_uuid:       version.body.group_uuid,
      public_date:      version.body.public_date,
      related_datasets: Vec::new(),
      duplicated_from:  version.body.duplicated_from,
    }
  }
}

/// Related dataset uuids of a version, whichever shape it is in.
pub(crate) fn related_uuids(s: &Session<'_>, version: &Version<Dataset>) -> Result<Vec<Uuid>> {
  if version.is_draft() {
    return Ok(version.body.related_datasets.clone());
  }
  s.uuids_for_versions(DocumentKind::Dataset, version.uuid, &version.body.related_datasets)
}

/// The template version ids a dataset bound to `template` must fill.
fn slots(template: &Version<Template>) -> Vec<Uuid> {
  template
    .body
    .related_templates
    .iter()
    .chain(&template.body.subscribed_templates)
    .copied()
    .collect()
}

fn slot_template(s: &Session<'_>, id: Uuid) -> Result<Version<Template>> {
  s.version::<Template>(id)?
    .filter(|v| !v.is_draft())
    .ok_or_else(|| {
      Error::input(format!("template version {id} does not exist or is not persisted"))
    })
}

fn require_admin(s: &mut Session<'_>, uuid: Uuid, action: &str) -> Result<()> {
  if s.has_permission(uuid, PermissionLevel::Admin)? {
    return Ok(());
  }
  Err(Error::denied(format!("admin permission is required to {action} dataset {uuid}")))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

fn resolve_root(s: &mut Session<'_>, input: DatasetInput) -> Result<Resolved> {
  let template = input
    .template_id
    .map(|id| s.version::<Template>(id))
    .transpose()?
    .flatten()
    .filter(|v| !v.is_draft())
    .ok_or_else(|| Error::input("a valid template_id was not provided for the head dataset"))?;

  let group_uuid = match input.uuid {
    Some(uuid) => s.latest_document::<Dataset>(uuid)?.map(|d| d.body.group_uuid),
    None => None,
  }
  .unwrap_or_else(Uuid::new_v4);

  resolve(s, input, &template, group_uuid, &mut HashSet::new())
}

fn resolve(
  s: &mut Session<'_>,
  input: DatasetInput,
  template: &Version<Template>,
  group_uuid: Uuid,
  ancestors: &mut HashSet<Uuid>,
) -> Result<Resolved> {
  let (uuid, group_uuid) = match input.uuid {
    Some(uuid) => {
      let Some(existing) = s.latest_document::<Dataset>(uuid)? else {
        return Err(Error::not_found(format!("no dataset exists with uuid {uuid}")));
      };
      require_admin(s, uuid, "update")?;
      // Existing datasets keep the group they were created in.
      (uuid, existing.body.group_uuid)
    }
    None => {
      let uuid = Uuid::new_v4();
      s.initialize_permissions(uuid)?;
      (uuid, group_uuid)
    }
  };

  if input.template_id != Some(template.id) {
    return Err(Error::input(format!(
      "dataset {uuid} expected template version {}",
      template.id
    )));
  }
  if !s.can_view::<Template>(template.uuid)? {
    return Err(Error::denied(format!(
      "view permission is required for template {} to build a dataset on it",
      template.uuid
    )));
  }
  if let Some(public_date) = input.public_date {
    match template.body.public_date {
      Some(template_date) if public_date >= template_date => {}
      _ => {
        return Err(Error::input(format!(
          "public_date of dataset {uuid} must be on or after the public_date of its template"
        )));
      }
    }
  }

  if !ancestors.insert(uuid) {
    return Err(Error::input(format!(
      "dataset {uuid} references itself; circular references are not permitted"
    )));
  }
  let related = resolve_related(
    s,
    input.related_datasets.unwrap_or_default(),
    template,
    group_uuid,
    ancestors,
  );
  ancestors.remove(&uuid);
  let (related_datasets, changed) = related?;

  let previous = s.latest_document::<Dataset>(uuid)?;
  let body = Dataset {
    template_id: template.id,
    group_uuid,
    public_date: input.public_date,
    related_datasets,
    duplicated_from: previous.and_then(|p| p.body.duplicated_from),
  };
  let differs = changed || differs_from_persisted(s, uuid, &body)?;
  lifecycle::settle_draft(s, uuid, body, differs)
}

fn resolve_related(
  s: &mut Session<'_>,
  input: Vec<DatasetInput>,
  template: &Version<Template>,
  group_uuid: Uuid,
  ancestors: &mut HashSet<Uuid>,
) -> Result<(Vec<Uuid>, bool)> {
  // Linked datasets need no reachability walk. Every slot is typed by a
  // related version of `template`, and template versions form no cycles, so
  // a dataset can never be reached again below itself.
  let slots = slots(template);
  let mut unfilled: HashSet<Uuid> = slots.iter().copied().collect();
  let mut seen = HashSet::new();
  let mut changed = false;
  let mut related = Vec::with_capacity(input.len());

  for mut child in input {
    if let Some(uuid) = child.uuid.filter(|uuid| !seen.insert(*uuid)) {
      return Err(Error::input(format!(
        "dataset {uuid} is related more than once; each related dataset may only be supplied once"
      )));
    }

    let stored = match child.uuid {
      Some(uuid) => s.latest_document::<Dataset>(uuid)?.map(|d| d.body.template_id),
      None => None,
    };
    let Some(template_id) = child.template_id.or(stored) else {
      return Err(Error::input("each related dataset must supply a template_id"));
    };
    if !slots.contains(&template_id) {
      return Err(Error::input(format!(
        "template version {template_id} is not a related template of {}",
        template.uuid
      )));
    }
    if !unfilled.remove(&template_id) {
      return Err(Error::input(format!(
        "the slot for template version {template_id} is filled more than once"
      )));
    }
    child.template_id = Some(template_id);

    let resolved = match child.referenced_uuid() {
      Some(uuid) => {
        if stored.is_some_and(|id| id != template_id) {
          return Err(Error::input(format!(
            "dataset {uuid} is not bound to template version {template_id}"
          )));
        }
        lifecycle::reference(s, DocumentKind::Dataset, uuid)
          .or_else(|err| lifecycle::link_unreachable(err, Some(uuid)))?
      }
      None => {
        let given = child.uuid;
        let slot = slot_template(s, template_id)?;
        resolve(s, child, &slot, group_uuid, ancestors)
          .or_else(|err| lifecycle::link_unreachable(err, given))?
      }
    };
    changed |= resolved.changed;
    related.push(resolved.uuid);
  }

  if !unfilled.is_empty() {
    return Err(Error::input(format!(
      "every related template of {} must be filled by a related dataset",
      template.uuid
    )));
  }
  Ok((related, changed))
}

fn differs_from_persisted(s: &Session<'_>, uuid: Uuid, body: &Dataset) -> Result<bool> {
  let Some(persisted) = s.latest_persisted::<Dataset>(uuid)? else {
    return Ok(true);
  };
  let related = related_uuids(s, &persisted)?;
  if body.template_id != persisted.body.template_id
    || !dates_equal(body.public_date, persisted.body.public_date)
    || !same_set(&body.related_datasets, &related)
  {
    return Ok(true);
  }

  let Some(since) = persisted.persist_date else {
    return Ok(true);
  };
  for child in &body.related_datasets {
    if s
      .latest_persist_date(DocumentKind::Dataset, *child)?
      .is_some_and(|d| d > since)
    {
      return Ok(true);
    }
  }
  Ok(false)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

fn draft_view(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<DatasetView>> {
  let Some(version) = s.latest_document::<Dataset>(uuid)? else {
    return Ok(None);
  };
  require_admin(s, uuid, "read the draft of")?;

  let mut view = DatasetView::shell(&version, false);
  for child in related_uuids(s, &version)? {
    let linked = projection::draft_child(
      s,
      child,
      |s| draft_view(s, child),
      |s| Dataset::latest_persisted(s, child),
    )?;
    view.related_datasets.push(linked.unwrap_or_else(|| Linked::deleted(child)));
  }
  Ok(Some(view))
}

fn persisted_tree(s: &mut Session<'_>, version: Version<Dataset>) -> Result<DatasetView> {
  let mut view = DatasetView::shell(&version, true);
  for id in &version.body.related_datasets {
    let Some(child) = s.version::<Dataset>(*id)? else {
      tracing::warn!(
        dataset = %version.uuid, version_id = %id,
        "persisted dataset points at a missing dataset version"
      );
      continue;
    };
    if s.can_view::<Dataset>(child.uuid)? {
      let tree = persisted_tree(s, child)?;
      view.related_datasets.push(Linked::Full(tree));
    } else {
      view.related_datasets.push(Linked::stub(child.uuid));
    }
  }
  Ok(view)
}

/// An input skeleton for a new dataset on the latest persisted version of
/// `template_uuid`, with one nested entry per slot the caller can see.
pub fn new_for_template(s: &mut Session<'_>, template_uuid: Uuid) -> Result<DatasetInput> {
  let Some(template) = s.latest_persisted::<Template>(template_uuid)? else {
    return Err(Error::not_found(format!(
      "no persisted template exists with uuid {template_uuid}"
    )));
  };
  if !s.can_view::<Template>(template_uuid)? {
    return Err(Error::denied(format!(
      "view permission is required for template {template_uuid}"
    )));
  }
  skeleton(s, &template)
}

fn skeleton(s: &mut Session<'_>, template: &Version<Template>) -> Result<DatasetInput> {
  let mut related = Vec::new();
  for id in slots(template) {
    let Some(child) = s.version::<Template>(id)? else { continue };
    if !s.can_view::<Template>(child.uuid)? {
      tracing::debug!(
        template = %template.uuid, related = %child.uuid,
        "omitting unviewable template from skeleton"
      );
      continue;
    }
    related.push(skeleton(s, &child)?);
  }
  Ok(DatasetInput {
    template_id: Some(template.id),
    related_datasets: Some(related),
    ..DatasetInput::default()
  })
}

// ─── Persist ─────────────────────────────────────────────────────────────────

/// Version ids the latest persisted version of `uuid` links, by dataset uuid.
fn pinned_related(s: &Session<'_>, uuid: Uuid) -> Result<HashMap<Uuid, Uuid>> {
  let mut pinned = HashMap::new();
  let Some(persisted) = s.latest_persisted::<Dataset>(uuid)? else {
    return Ok(pinned);
  };
  for id in persisted.body.related_datasets {
    if let Some(child) = s.uuid_for_version(DocumentKind::Dataset, id)? {
      pinned.insert(child, id);
    }
  }
  Ok(pinned)
}

/// Link a related dataset this persist does not freeze. A dataset the caller
/// may view links its latest persisted version; one they may not view keeps
/// the version its parent already pinned.
fn link_persisted(s: &mut Session<'_>, uuid: Uuid, pinned: Option<Uuid>) -> Result<Uuid> {
  let persisted = s.latest_persisted_meta(DocumentKind::Dataset, uuid)?;
  if let Some(persisted) = &persisted {
    if s.can_view::<Dataset>(uuid)? {
      return Ok(persisted.id);
    }
  }
  match (pinned, persisted) {
    (Some(id), _) => Ok(id),
    (None, Some(_)) => Err(Error::input(format!(
      "view permission is required to link dataset {uuid}"
    ))),
    (None, None) => Err(Error::input(format!(
      "no permission to persist the draft of dataset {uuid}, and no persisted version exists"
    ))),
  }
}

fn persist_recursor(
  s: &mut Session<'_>,
  uuid: Uuid,
  template: &Version<Template>,
  pinned: Option<Uuid>,
) -> Result<Uuid> {
  let Some(draft) = s.draft::<Dataset>(uuid)? else {
    if !s.exists(DocumentKind::Dataset, uuid)? {
      return Err(Error::not_found(format!("dataset {uuid} does not exist")));
    }
    return link_persisted(s, uuid, pinned);
  };
  if !s.has_permission(uuid, PermissionLevel::Admin)? {
    tracing::debug!(%uuid, "linking dataset draft without admin permission");
    return link_persisted(s, uuid, pinned);
  }
  if draft.body.template_id != template.id {
    return Err(Error::input(format!(
      "the draft of dataset {uuid} does not reference template version {}",
      template.id
    )));
  }

  let slots = slots(template);
  let pins = pinned_related(s, uuid)?;
  let mut unfilled: HashSet<Uuid> = slots.iter().copied().collect();
  let mut related_datasets = Vec::with_capacity(draft.body.related_datasets.len());
  for child in &draft.body.related_datasets {
    let Some(document) = s.latest_document::<Dataset>(*child)? else {
      return Err(Error::input(format!(
        "related dataset {child} no longer exists; update the draft of {uuid} before persisting"
      )));
    };
    let template_id = document.body.template_id;
    if !slots.contains(&template_id) {
      return Err(Error::input(format!(
        "related dataset {child} is bound to a template version that {uuid}'s template does not \
         relate; the template may have been persisted since the last update"
      )));
    }
    unfilled.remove(&template_id);
    let slot = slot_template(s, template_id)?;
    let id = match persist_recursor(s, *child, &slot, pins.get(child).copied()) {
      Ok(id) => id,
      Err(err) => lifecycle::fall_back_to_persisted(s, DocumentKind::Dataset, *child, err)?,
    };
    related_datasets.push(id);
  }
  if !unfilled.is_empty() {
    return Err(Error::input(format!(
      "every related template must be filled by a related dataset before dataset {uuid} can be \
       persisted"
    )));
  }

  let body = Dataset { related_datasets, ..draft.body.clone() };
  Ok(s.mark_persisted(draft, body)?.id)
}

fn effective_last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
  let Some(version) = s.latest_document::<Dataset>(uuid)? else {
    return Err(Error::not_found(format!("no dataset exists with uuid {uuid}")));
  };
  if !s.has_permission(uuid, PermissionLevel::Admin)? {
    let Some(persisted) = s.latest_persisted::<Dataset>(uuid)? else {
      return Err(Error::denied(format!(
        "no permission for the draft of dataset {uuid}, and no persisted version exists"
      )));
    };
    if !s.can_view::<Dataset>(uuid)? {
      return Err(Error::denied(format!("view permission is required for dataset {uuid}")));
    }
    return Ok(persisted.updated_at);
  }

  let mut last = version.updated_at;
  for child in related_uuids(s, &version)? {
    match effective_last_update(s, child) {
      Ok(at) => last = last.max(at),
      Err(err) if err.is_unreachable() => {}
      Err(err) => return Err(err),
    }
  }
  Ok(last)
}

// ─── Duplicate ───────────────────────────────────────────────────────────────

struct Duplication {
  original_group: Uuid,
  new_group:      Uuid,
  /// Original uuid → copy uuid.
  copies:         HashMap<Uuid, Uuid>,
}

fn duplicate_version(
  s: &mut Session<'_>,
  version: Version<Dataset>,
  dup: &mut Duplication,
) -> Result<Uuid> {
  if !s.can_view::<Dataset>(version.uuid)? {
    return Err(Error::denied(format!(
      "view permission is required to duplicate dataset {}",
      version.uuid
    )));
  }
  // Datasets from another group are linked, not copied.
  if version.body.group_uuid != dup.original_group {
    return Ok(version.uuid);
  }
  if let Some(copy) = dup.copies.get(&version.uuid) {
    return Ok(*copy);
  }
  let uuid = Uuid::new_v4();
  dup.copies.insert(version.uuid, uuid);
  s.initialize_permissions(uuid)?;

  let mut related_datasets = Vec::new();
  for id in &version.body.related_datasets {
    let Some(child) = s.version::<Dataset>(*id)? else { continue };
    match duplicate_version(s, child, dup) {
      Ok(copy) => related_datasets.push(copy),
      Err(err) if err.is_unreachable() => {
        tracing::debug!(
          dataset = %version.uuid, related_version = %id,
          "not duplicating unviewable dataset"
        );
      }
      Err(err) => return Err(err),
    }
  }

  let body = Dataset {
    template_id: version.body.template_id,
    group_uuid: dup.new_group,
    public_date: None,
    related_datasets,
    duplicated_from: Some(version.uuid),
  };
  s.upsert_draft(uuid, body)?;
  Ok(uuid)
}

// ─── Publications ────────────────────────────────────────────────────────────

fn publication_time(s: &Session<'_>, uuid: Uuid, name: &str) -> Result<DateTime<Utc>> {
  if name.trim().is_empty() {
    return Err(Error::input("a published dataset version must have a name"));
  }
  s.publication(uuid, name)?.ok_or_else(|| {
    Error::not_found(format!("dataset {uuid} has no published version named {name:?}"))
  })
}

/// Mark the current moment as the published version `name` of `uuid`.
pub fn publish(s: &mut Session<'_>, uuid: Uuid, name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::input("a published dataset version must have a name"));
  }
  if s.latest_persisted_meta(DocumentKind::Dataset, uuid)?.is_none() {
    return Err(Error::not_found(format!(
      "no persisted dataset with uuid {uuid} exists to be published"
    )));
  }
  require_admin(s, uuid, "publish")?;
  if s.publication(uuid, name)?.is_some() {
    return Err(Error::input(format!(
      "dataset {uuid} already has a published version named {name:?}"
    )));
  }
  let at = s.now();
  s.put_publication(uuid, name, at)?;
  tracing::info!(%uuid, name, %at, "dataset published");
  Ok(())
}

/// The dataset as it stood when it was published under `name`.
pub fn published(s: &mut Session<'_>, uuid: Uuid, name: &str) -> Result<Option<DatasetView>> {
  let at = publication_time(s, uuid, name)?;
  Dataset::persisted_before(s, uuid, at)
}

/// Every record of the dataset as it stood when the dataset was published
/// under `name`. Records first persisted after that moment are left out.
pub fn published_records(
  s: &mut Session<'_>,
  uuid: Uuid,
  name: &str,
) -> Result<Vec<RecordView>> {
  if !s.can_view::<Dataset>(uuid)? {
    return Err(Error::denied(format!("view permission is required for dataset {uuid}")));
  }
  let at = publication_time(s, uuid, name)?;
  let mut records = Vec::new();
  for record in s.records_in_dataset(uuid)? {
    if let Some(view) = Record::persisted_before(s, record, at)? {
      records.push(view);
    }
  }
  Ok(records)
}

// ─── Document ────────────────────────────────────────────────────────────────

impl Document for Dataset {
  type Input = DatasetInput;
  type View = DatasetView;

  fn create(s: &mut Session<'_>, mut input: DatasetInput) -> Result<Uuid> {
    input.uuid = None;
    Ok(resolve_root(s, input)?.uuid)
  }

  fn update(s: &mut Session<'_>, uuid: Uuid, mut input: DatasetInput) -> Result<()> {
    input.uuid = Some(uuid);
    resolve_root(s, input).map(|_| ())
  }

  fn draft_get(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<DatasetView>> {
    draft_view(s, uuid)
  }

  fn draft_delete(s: &mut Session<'_>, uuid: Uuid) -> Result<()> {
    lifecycle::delete_draft_guarded(s, Self::KIND, uuid, uuid, PermissionLevel::Admin)
  }

  fn persist(
    s: &mut Session<'_>,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()> {
    let draft = lifecycle::require_persistable::<Self>(s, uuid, uuid)?;
    let current = effective_last_update(s, uuid)?;
    lifecycle::check_last_update(last_update, current)?;
    let template = slot_template(s, draft.body.template_id)?;
    let id = persist_recursor(s, uuid, &template, None)?;
    tracing::info!(%uuid, version_id = %id, "dataset persisted");
    Ok(())
  }

  fn persisted_before(
    s: &mut Session<'_>,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<DatasetView>> {
    let Some(version) = s.persisted_before::<Self>(uuid, at)? else {
      return Ok(None);
    };
    if !s.can_view::<Self>(uuid)? {
      return Err(Error::denied(format!("view permission is required for dataset {uuid}")));
    }
    persisted_tree(s, version).map(Some)
  }

  fn persisted_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<DatasetView>> {
    let Some(version) = s.version::<Self>(id)?.filter(|v| !v.is_draft()) else {
      return Ok(None);
    };
    let uuid = version.uuid;
    if !s.can_view::<Self>(uuid)? {
      return Err(Error::denied(format!("view permission is required for dataset {uuid}")));
    }
    persisted_tree(s, version).map(Some)
  }

  fn last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
    effective_last_update(s, uuid)
  }

  fn duplicate(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
    let Some(version) = s.latest_persisted::<Self>(uuid)? else {
      return Err(Error::not_found(format!("persisted dataset {uuid} does not exist")));
    };
    let mut dup = Duplication {
      original_group: version.body.group_uuid,
      new_group:      Uuid::new_v4(),
      copies:         HashMap::new(),
    };
    duplicate_version(s, version, &mut dup)
  }
}
