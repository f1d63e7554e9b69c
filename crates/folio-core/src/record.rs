//! Records: data entered against a persisted dataset and its template.
//!
//! Records carry no ledger entries of their own; every permission check is
//! made against the record's dataset.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  dataset::Dataset,
  document::{Body, DocumentKind, Version, has_duplicates, same_set},
  field::{FieldType, TemplateField, dates_equal},
  lifecycle::{self, Document, Resolved},
  options::{self, OptionValue},
  permission::PermissionLevel,
  projection::{self, Linked},
  session::Session,
  template::Template,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// An opaque pointer into the external file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
  pub uuid: Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

/// One template field as filled in by a record. `uuid` is the template
/// field's uuid; exactly one of the value slots applies, chosen by the
/// field's type and options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
  pub uuid:        Uuid,
  #[serde(default)]
  pub name:        String,
  #[serde(default)]
  pub description: String,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub field_type:  Option<FieldType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub values:      Option<Vec<OptionValue>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file:        Option<FileRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub images:      Option<Vec<FileRef>>,
}

impl RecordField {
  fn same_content(&self, other: &Self) -> bool {
    if self.uuid != other.uuid
      || self.name != other.name
      || self.description != other.description
      || self.field_type != other.field_type
    {
      return false;
    }
    match self.field_type {
      Some(FieldType::File) => self.file == other.file,
      Some(FieldType::Image) => same_files(
        self.images.as_deref().unwrap_or_default(),
        other.images.as_deref().unwrap_or_default(),
      ),
      None if self.values.is_some() || other.values.is_some() => {
        let uuids = |values: &Option<Vec<OptionValue>>| -> Vec<Uuid> {
          values.iter().flatten().map(|v| v.uuid).collect()
        };
        same_set(&uuids(&self.values), &uuids(&other.values))
      }
      None => self.value == other.value,
    }
  }
}

fn same_files(a: &[FileRef], b: &[FileRef]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut a: Vec<_> = a.iter().collect();
  let mut b: Vec<_> = b.iter().collect();
  a.sort_by_key(|f| f.uuid);
  b.sort_by_key(|f| f.uuid);
  a == b
}

/// Fields are stored in template order, so they compare positionally.
fn same_fields(a: &[RecordField], b: &[RecordField]) -> bool {
  a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same_content(b))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub dataset_uuid:    Uuid,
  /// The dataset version this record was persisted against.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dataset_id:      Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub fields:          Vec<RecordField>,
  /// Record uuids in a draft, version ids once persisted.
  #[serde(default)]
  pub related_records: Vec<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from: Option<Uuid>,
}

impl Body for Record {
  const KIND: DocumentKind = DocumentKind::Record;

  fn public_date(&self) -> Option<DateTime<Utc>> { self.public_date }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
  pub uuid: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFieldInput {
  /// The template field being filled in.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:   Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub values: Option<Vec<SelectedOption>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file:   Option<FileRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub images: Option<Vec<FileRef>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:            Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dataset_uuid:    Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:     Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fields:          Option<Vec<RecordFieldInput>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub related_records: Option<Vec<RecordInput>>,
}

impl RecordInput {
  pub fn reference(uuid: Uuid) -> Self {
    Self { uuid: Some(uuid), ..Self::default() }
  }

  pub fn referenced_uuid(&self) -> Option<Uuid> {
    let bare = self.public_date.is_none()
      && self.fields.is_none()
      && self.related_records.is_none();
    self.uuid.filter(|_| bare)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id:              Option<Uuid>,
  pub uuid:            Uuid,
  pub updated_at:      DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub persist_date:    Option<DateTime<Utc>>,
  pub dataset_uuid:    Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dataset_id:      Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:     Option<DateTime<Utc>>,
  pub fields:          Vec<RecordField>,
  pub related_records: Vec<Linked<RecordView>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from: Option<Uuid>,
}

impl RecordView {
  fn shell(version: &Version<Record>, persisted: bool) -> Self {
    Self {
      id:              persisted.then_some(version.id),
      uuid:            version.uuid,
      updated_at:      version.updated_at,
      persist_date:    if persisted { version.persist_date } else { None },
      dataset_uuid:    version.body.dataset_uuid,
      dataset_id:      if persisted { version.body.dataset_id } else { None },
      public_date:     version.body.public_date,
      fields:          version.body.fields.clone(),
      related_records: Vec::new(),
      duplicated_from: version.body.duplicated_from,
    }
  }
}

// ─── Dataset binding ─────────────────────────────────────────────────────────

/// The persisted dataset version a record is validated against, with the
/// template version it is bound to.
struct Binding {
  dataset:  Version<Dataset>,
  template: Version<Template>,
}

impl Binding {
  fn for_dataset(s: &Session<'_>, dataset: Version<Dataset>) -> Result<Self> {
    let Some(template) = s.version::<Template>(dataset.body.template_id)? else {
      return Err(Error::Internal(format!(
        "dataset {} is bound to missing template version {}",
        dataset.uuid, dataset.body.template_id
      )));
    };
    Ok(Self { dataset, template })
  }

  fn latest(s: &Session<'_>, dataset_uuid: Uuid) -> Result<Self> {
    let Some(dataset) = s.latest_persisted::<Dataset>(dataset_uuid)? else {
      return Err(Error::input(format!(
        "a valid dataset_uuid was not provided; no persisted dataset {dataset_uuid}"
      )));
    };
    Self::for_dataset(s, dataset)
  }

  /// The related datasets of the bound version, by dataset uuid.
  fn related(&self, s: &Session<'_>) -> Result<HashMap<Uuid, Version<Dataset>>> {
    let mut related = HashMap::new();
    for id in &self.dataset.body.related_datasets {
      match s.version::<Dataset>(*id)? {
        Some(version) => {
          related.insert(version.uuid, version);
        }
        None => tracing::warn!(
          dataset = %self.dataset.uuid, version_id = %id,
          "dataset points at a missing dataset version"
        ),
      }
    }
    Ok(related)
  }
}

fn require_on_dataset(
  s: &mut Session<'_>,
  dataset: Uuid,
  level: PermissionLevel,
  action: &str,
) -> Result<()> {
  if s.has_permission(dataset, level)? {
    return Ok(());
  }
  Err(Error::denied(format!(
    "{} permission on dataset {dataset} is required to {action} its records",
    level.as_str()
  )))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

fn resolve_root(s: &mut Session<'_>, mut input: RecordInput) -> Result<Resolved> {
  if input.dataset_uuid.is_none() {
    if let Some(uuid) = input.uuid {
      input.dataset_uuid = s.latest_document::<Record>(uuid)?.map(|r| r.body.dataset_uuid);
    }
  }
  let Some(dataset_uuid) = input.dataset_uuid else {
    return Err(Error::input("a valid dataset_uuid was not provided"));
  };
  let binding = Binding::latest(s, dataset_uuid)?;
  resolve(s, input, &binding, &mut HashSet::new())
}

fn resolve(
  s: &mut Session<'_>,
  input: RecordInput,
  binding: &Binding,
  seen: &mut HashSet<Uuid>,
) -> Result<Resolved> {
  let uuid = match input.uuid {
    Some(uuid) => {
      if !s.exists(DocumentKind::Record, uuid)? {
        return Err(Error::not_found(format!("no record exists with uuid {uuid}")));
      }
      uuid
    }
    None => Uuid::new_v4(),
  };
  require_on_dataset(s, binding.dataset.uuid, PermissionLevel::Edit, "create or update")?;

  // A record reached twice in one request is only updated the first time.
  if !seen.insert(uuid) {
    return Ok(Resolved { uuid, changed: s.has_draft(DocumentKind::Record, uuid)? });
  }

  if let Some(persisted) = s.latest_persisted::<Record>(uuid)? {
    if input.dataset_uuid != Some(persisted.body.dataset_uuid) {
      return Err(Error::input(format!(
        "record {uuid} belongs to dataset {}; once persisted, a record may never change datasets",
        persisted.body.dataset_uuid
      )));
    }
  }
  if input.dataset_uuid != Some(binding.dataset.uuid) {
    return Err(Error::input(format!(
      "record {uuid} must belong to dataset {}",
      binding.dataset.uuid
    )));
  }

  let fields = build_fields(s, input.fields.unwrap_or_default(), &binding.template)?;
  let (related_records, changed) =
    resolve_related(s, input.related_records.unwrap_or_default(), binding, seen)?;

  let previous = s.latest_document::<Record>(uuid)?;
  let body = Record {
    dataset_uuid: binding.dataset.uuid,
    dataset_id: None,
    public_date: input.public_date,
    fields,
    related_records,
    duplicated_from: previous.and_then(|p| p.body.duplicated_from),
  };
  let differs = changed || differs_from_persisted(s, uuid, &body)?;
  lifecycle::settle_draft(s, uuid, body, differs)
}

/// Lay the submitted values over the template's fields, in template order.
fn build_fields(
  s: &Session<'_>,
  input: Vec<RecordFieldInput>,
  template: &Version<Template>,
) -> Result<Vec<RecordField>> {
  let mut given = HashMap::with_capacity(input.len());
  for field in input {
    let Some(uuid) = field.uuid else {
      return Err(Error::input("each field in the record must supply a template field uuid"));
    };
    if given.insert(uuid, field).is_some() {
      return Err(Error::input(format!(
        "field {uuid} is supplied more than once; a record may only supply one value per field"
      )));
    }
  }

  let mut fields = Vec::with_capacity(template.body.fields.len());
  for id in &template.body.fields {
    let Some(template_field) = s.version::<TemplateField>(*id)? else {
      tracing::warn!(
        template = %template.uuid, version_id = %id,
        "template points at a missing field version"
      );
      continue;
    };
    let data = given.remove(&template_field.uuid).unwrap_or_default();
    let TemplateField { name, description, field_type, options, .. } = template_field.body;
    let mut field = RecordField {
      uuid: template_field.uuid,
      name,
      description,
      field_type,
      ..RecordField::default()
    };
    match (field_type, options) {
      (Some(FieldType::File), _) => field.file = data.file,
      (Some(FieldType::Image), _) => field.images = data.images,
      (None, Some(options)) => {
        let selected: Vec<Uuid> = data.values.iter().flatten().map(|v| v.uuid).collect();
        field.values = Some(options::option_values(&options, &selected)?);
      }
      (None, None) => field.value = data.value,
    }
    fields.push(field);
  }
  Ok(fields)
}

fn resolve_related(
  s: &mut Session<'_>,
  input: Vec<RecordInput>,
  binding: &Binding,
  seen: &mut HashSet<Uuid>,
) -> Result<(Vec<Uuid>, bool)> {
  // No reachability walk is needed. A related record must sit in a related
  // dataset of this record's dataset, and dataset slots are typed by acyclic
  // template versions, so a record can never be reached again below itself.
  let related_datasets = binding.related(s)?;
  let mut changed = false;
  let mut related = Vec::with_capacity(input.len());

  for child in input {
    let resolved = match child.referenced_uuid() {
      Some(uuid) => {
        let Some(existing) = s.latest_document::<Record>(uuid)? else {
          return Err(Error::input(format!("no record exists with uuid {uuid}")));
        };
        let dataset_uuid = existing.body.dataset_uuid;
        if child.dataset_uuid.is_some_and(|given| given != dataset_uuid)
          || !related_datasets.contains_key(&dataset_uuid)
        {
          return Err(Error::input(format!(
            "related record {uuid} must belong to a related dataset of {}",
            binding.dataset.uuid
          )));
        }
        lifecycle::reference(s, DocumentKind::Record, uuid)?
      }
      None => {
        let Some(dataset_uuid) = child.dataset_uuid else {
          return Err(Error::input("each related record must supply a dataset_uuid"));
        };
        let Some(dataset) = related_datasets.get(&dataset_uuid) else {
          return Err(Error::input(format!(
            "dataset {dataset_uuid} is not a related dataset of {}",
            binding.dataset.uuid
          )));
        };
        let child_binding = Binding::for_dataset(s, dataset.clone())?;
        let given = child.uuid;
        resolve(s, child, &child_binding, seen)
          .or_else(|err| lifecycle::link_unreachable(err, given))?
      }
    };
    changed |= resolved.changed;
    related.push(resolved.uuid);
  }

  if has_duplicates(&related) {
    return Err(Error::input("each record may only relate to another record once"));
  }
  Ok((related, changed))
}

fn differs_from_persisted(s: &Session<'_>, uuid: Uuid, body: &Record) -> Result<bool> {
  let Some(persisted) = s.latest_persisted::<Record>(uuid)? else {
    return Ok(true);
  };
  let related = s.uuids_for_versions(DocumentKind::Record, uuid, &persisted.body.related_records)?;
  if body.dataset_uuid != persisted.body.dataset_uuid
    || !dates_equal(body.public_date, persisted.body.public_date)
    || !same_fields(&body.fields, &persisted.body.fields)
    || !same_set(&body.related_records, &related)
  {
    return Ok(true);
  }

  let latest_dataset = s.latest_persisted_meta(DocumentKind::Dataset, body.dataset_uuid)?;
  if latest_dataset.map(|d| d.id) != persisted.body.dataset_id {
    return Ok(true);
  }

  let Some(since) = persisted.persist_date else {
    return Ok(true);
  };
  for child in &body.related_records {
    if s
      .latest_persist_date(DocumentKind::Record, *child)?
      .is_some_and(|d| d > since)
    {
      return Ok(true);
    }
  }
  Ok(false)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

fn related_uuids(s: &Session<'_>, version: &Version<Record>) -> Result<Vec<Uuid>> {
  if version.is_draft() {
    return Ok(version.body.related_records.clone());
  }
  s.uuids_for_versions(DocumentKind::Record, version.uuid, &version.body.related_records)
}

fn draft_view(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<RecordView>> {
  let Some(version) = s.latest_document::<Record>(uuid)? else {
    return Ok(None);
  };
  as_draft(s, &version).map(Some)
}

/// Render `version` the way a draft of it reads, whether or not it is one.
fn as_draft(s: &mut Session<'_>, version: &Version<Record>) -> Result<RecordView> {
  require_on_dataset(s, version.body.dataset_uuid, PermissionLevel::Edit, "read drafts of")?;

  let mut view = RecordView::shell(version, false);
  for child in related_uuids(s, version)? {
    let linked = projection::draft_child(
      s,
      child,
      |s| draft_view(s, child),
      |s| Record::latest_persisted(s, child),
    )?;
    let linked = match linked {
      Some(linked) => match s.latest_document::<Record>(child)? {
        Some(existing) => linked.in_dataset(existing.body.dataset_uuid),
        None => linked,
      },
      None => Linked::deleted(child),
    };
    view.related_records.push(linked);
  }
  Ok(view)
}

/// The latest persisted version of `uuid` rendered as a fresh draft, ignoring
/// any draft that already exists. `None` when nothing was ever persisted.
pub fn new_draft_from_latest_persisted(
  s: &mut Session<'_>,
  uuid: Uuid,
) -> Result<Option<RecordView>> {
  let Some(version) = s.latest_persisted::<Record>(uuid)? else {
    return Ok(None);
  };
  as_draft(s, &version).map(Some)
}

/// Records are visible when their dataset is.
fn visible(s: &mut Session<'_>, dataset_uuid: Uuid) -> Result<bool> {
  s.can_view::<Dataset>(dataset_uuid)
}

fn persisted_tree(s: &mut Session<'_>, version: Version<Record>) -> Result<RecordView> {
  let mut view = RecordView::shell(&version, true);
  for id in &version.body.related_records {
    let Some(child) = s.version::<Record>(*id)? else {
      tracing::warn!(
        record = %version.uuid, version_id = %id,
        "persisted record points at a missing record version"
      );
      continue;
    };
    if visible(s, child.body.dataset_uuid)? {
      let tree = persisted_tree(s, child)?;
      view.related_records.push(Linked::Full(tree));
    } else {
      view.related_records.push(Linked::stub(child.uuid));
    }
  }
  Ok(view)
}

// ─── Persist ─────────────────────────────────────────────────────────────────

fn persist_recursor(s: &mut Session<'_>, uuid: Uuid, binding: &Binding) -> Result<Uuid> {
  let persisted = s.latest_persisted_meta(DocumentKind::Record, uuid)?;
  let Some(draft) = s.draft::<Record>(uuid)? else {
    return persisted
      .map(|v| v.id)
      .ok_or_else(|| Error::not_found(format!("record {uuid} does not exist")));
  };
  require_on_dataset(s, binding.dataset.uuid, PermissionLevel::Admin, "persist")?;

  if s
    .latest_persist_date(DocumentKind::Dataset, draft.body.dataset_uuid)?
    .is_some_and(|d| d > draft.updated_at)
  {
    return Err(Error::input(format!(
      "the dataset of record {uuid} was persisted after the record was last updated; \
       update the record again before persisting"
    )));
  }
  let related_datasets = binding.related(s)?;
  let mut related_records = Vec::with_capacity(draft.body.related_records.len());
  for child in &draft.body.related_records {
    let Some(document) = s.latest_document::<Record>(*child)? else {
      return Err(Error::input(format!(
        "related record {child} no longer exists; update the draft of {uuid} before persisting"
      )));
    };
    let Some(dataset) = related_datasets.get(&document.body.dataset_uuid) else {
      return Err(Error::input(format!(
        "related record {child} belongs to a dataset that is not related to {}; \
         the dataset may have been persisted since the last update",
        binding.dataset.uuid
      )));
    };
    let child_binding = Binding::for_dataset(s, dataset.clone())?;
    let id = match persist_recursor(s, *child, &child_binding) {
      Ok(id) => id,
      Err(err) => lifecycle::fall_back_to_persisted(s, DocumentKind::Record, *child, err)?,
    };
    related_records.push(id);
  }

  let body = Record {
    dataset_id: Some(binding.dataset.id),
    related_records,
    ..draft.body.clone()
  };
  Ok(s.mark_persisted(draft, body)?.id)
}

fn effective_last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
  let Some(version) = s.latest_document::<Record>(uuid)? else {
    return Err(Error::not_found(format!("no record exists with uuid {uuid}")));
  };
  let dataset_uuid = version.body.dataset_uuid;
  if !s.has_permission(dataset_uuid, PermissionLevel::Edit)? {
    let Some(persisted) = s.latest_persisted::<Record>(uuid)? else {
      return Err(Error::denied(format!(
        "no permission for the draft of record {uuid}, and no persisted version exists"
      )));
    };
    if !visible(s, dataset_uuid)? {
      return Err(Error::denied(format!("view permission is required for record {uuid}")));
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

fn duplicate_version(
  s: &mut Session<'_>,
  version: Version<Record>,
  copies: &mut HashMap<Uuid, Uuid>,
) -> Result<Uuid> {
  let dataset_uuid = version.body.dataset_uuid;
  if !visible(s, dataset_uuid)? {
    return Err(Error::denied(format!(
      "view permission is required to duplicate record {}",
      version.uuid
    )));
  }
  require_on_dataset(s, dataset_uuid, PermissionLevel::Edit, "create")?;
  if let Some(copy) = copies.get(&version.uuid) {
    return Ok(*copy);
  }
  let uuid = Uuid::new_v4();
  copies.insert(version.uuid, uuid);

  let mut related_records = Vec::new();
  for id in &version.body.related_records {
    let Some(child) = s.version::<Record>(*id)? else { continue };
    match duplicate_version(s, child, copies) {
      Ok(copy) => related_records.push(copy),
      Err(err) if err.is_unreachable() => {
        tracing::debug!(
          record = %version.uuid, related_version = %id,
          "not duplicating unreachable record"
        );
      }
      Err(err) => return Err(err),
    }
  }

  let body = Record {
    dataset_id: None,
    public_date: None,
    related_records,
    duplicated_from: Some(version.uuid),
    ..version.body
  };
  s.upsert_draft(uuid, body)?;
  Ok(uuid)
}

// ─── Document ────────────────────────────────────────────────────────────────

impl Document for Record {
  type Input = RecordInput;
  type View = RecordView;

  fn create(s: &mut Session<'_>, mut input: RecordInput) -> Result<Uuid> {
    input.uuid = None;
    Ok(resolve_root(s, input)?.uuid)
  }

  fn update(s: &mut Session<'_>, uuid: Uuid, mut input: RecordInput) -> Result<()> {
    input.uuid = Some(uuid);
    resolve_root(s, input).map(|_| ())
  }

  fn draft_get(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<RecordView>> {
    draft_view(s, uuid)
  }

  fn draft_delete(s: &mut Session<'_>, uuid: Uuid) -> Result<()> {
    let Some(draft) = s.draft::<Self>(uuid)? else {
      return Err(Error::not_found(format!("no record draft exists with uuid {uuid}")));
    };
    let dataset_uuid = draft.body.dataset_uuid;
    lifecycle::delete_draft_guarded(s, Self::KIND, uuid, dataset_uuid, PermissionLevel::Edit)
  }

  fn persist(
    s: &mut Session<'_>,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()> {
    let Some(draft) = s.draft::<Self>(uuid)? else {
      return Err(lifecycle::nothing_to_persist(s, Self::KIND, uuid));
    };
    let dataset_uuid = draft.body.dataset_uuid;
    lifecycle::require_persistable::<Self>(s, uuid, dataset_uuid)?;
    let current = effective_last_update(s, uuid)?;
    lifecycle::check_last_update(last_update, current)?;
    let binding = Binding::latest(s, dataset_uuid)?;
    let id = persist_recursor(s, uuid, &binding)?;
    tracing::info!(%uuid, version_id = %id, dataset = %dataset_uuid, "record persisted");
    Ok(())
  }

  fn persisted_before(
    s: &mut Session<'_>,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<RecordView>> {
    let Some(version) = s.persisted_before::<Self>(uuid, at)? else {
      return Ok(None);
    };
    if !visible(s, version.body.dataset_uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for records in dataset {}",
        version.body.dataset_uuid
      )));
    }
    persisted_tree(s, version).map(Some)
  }

  fn persisted_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<RecordView>> {
    let Some(version) = s.version::<Self>(id)?.filter(|v| !v.is_draft()) else {
      return Ok(None);
    };
    if !visible(s, version.body.dataset_uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for records in dataset {}",
        version.body.dataset_uuid
      )));
    }
    persisted_tree(s, version).map(Some)
  }

  fn last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
    effective_last_update(s, uuid)
  }

  fn duplicate(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
    let Some(version) = s.latest_persisted::<Self>(uuid)? else {
      return Err(Error::not_found(format!("persisted record {uuid} does not exist")));
    };
    duplicate_version(s, version, &mut HashMap::new())
  }

  /// Persisted records of public datasets.
  fn all_public_uuids(s: &mut Session<'_>) -> Result<Vec<Uuid>> {
    let mut uuids = Vec::new();
    for dataset in s.public_uuids(DocumentKind::Dataset)? {
      for uuid in s.records_in_dataset(dataset)? {
        if s.latest_persisted_meta(Self::KIND, uuid)?.is_some() {
          uuids.push(uuid);
        }
      }
    }
    uuids.sort_unstable();
    Ok(uuids)
  }

  /// Every record, drafts included, of a dataset the viewer may view.
  fn all_viewable_uuids(s: &mut Session<'_>) -> Result<Vec<Uuid>> {
    let mut uuids = Vec::new();
    for dataset in s.viewable_uuids(DocumentKind::Dataset)? {
      uuids.extend(s.records_in_dataset(dataset)?);
    }
    uuids.sort_unstable();
    uuids.dedup();
    Ok(uuids)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(uuid: Uuid, value: &str) -> RecordField {
    RecordField { uuid, name: "t".into(), value: Some(value.into()), ..RecordField::default() }
  }

  #[test]
  fn text_fields_compare_by_value() {
    let id = Uuid::new_v4();
    assert!(same_fields(&[text(id, "a")], &[text(id, "a")]));
    assert!(!same_fields(&[text(id, "a")], &[text(id, "b")]));
    assert!(!same_fields(&[text(id, "a")], &[]));
  }

  #[test]
  fn option_values_ignore_order_and_names() {
    let (id, x, y) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let with = |values: Vec<OptionValue>| RecordField {
      uuid: id,
      values: Some(values),
      ..RecordField::default()
    };
    let a = with(vec![
      OptionValue { uuid: x, name: "x".into() },
      OptionValue { uuid: y, name: "y".into() },
    ]);
    let b = with(vec![
      OptionValue { uuid: y, name: "renamed".into() },
      OptionValue { uuid: x, name: "x".into() },
    ]);
    assert!(a.same_content(&b));
    assert!(!a.same_content(&with(vec![OptionValue { uuid: x, name: "x".into() }])));
  }

  #[test]
  fn images_compare_as_a_set() {
    let id = Uuid::new_v4();
    let (p, q) = (
      FileRef { uuid: Uuid::new_v4(), name: Some("p.png".into()) },
      FileRef { uuid: Uuid::new_v4(), name: None },
    );
    let with = |images: Vec<FileRef>| RecordField {
      uuid: id,
      field_type: Some(FieldType::Image),
      images: Some(images),
      ..RecordField::default()
    };
    assert!(with(vec![p.clone(), q.clone()]).same_content(&with(vec![q.clone(), p.clone()])));
    assert!(!with(vec![p.clone()]).same_content(&with(vec![q])));
  }

  #[test]
  fn bare_references_may_name_their_dataset() {
    let id = Uuid::new_v4();
    assert_eq!(RecordInput::reference(id).referenced_uuid(), Some(id));
    let input = RecordInput {
      uuid: Some(id),
      dataset_uuid: Some(Uuid::new_v4()),
      ..RecordInput::default()
    };
    assert_eq!(input.referenced_uuid(), Some(id));
    let input = RecordInput { fields: Some(vec![]), ..RecordInput::reference(id) };
    assert_eq!(input.referenced_uuid(), None);
  }
}
