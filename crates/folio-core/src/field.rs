//! Template fields: the leaves of a template tree.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{Body, DocumentKind, Version, same_millis},
  lifecycle::{self, Document, Resolved},
  options::{self, FieldOption, OptionInput},
  permission::PermissionLevel,
  session::Session,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// Forces the record value of a field into one of the non-text shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
  File,
  Image,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
  #[serde(default)]
  pub name:            String,
  #[serde(default)]
  pub description:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:     Option<DateTime<Utc>>,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub field_type:      Option<FieldType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options:         Option<Vec<FieldOption>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from: Option<Uuid>,
}

impl Body for TemplateField {
  const KIND: DocumentKind = DocumentKind::TemplateField;

  fn public_date(&self) -> Option<DateTime<Utc>> { self.public_date }
}

impl TemplateField {
  /// Content equality; bookkeeping and `duplicated_from` are ignored.
  pub fn same_content(&self, other: &Self) -> bool {
    self.name == other.name
      && self.description == other.description
      && self.field_type == other.field_type
      && dates_equal(self.public_date, other.public_date)
      && match (&self.options, &other.options) {
        (None, None) => true,
        (Some(a), Some(b)) => options::options_equal(a, b),
        _ => false,
      }
  }
}

pub(crate) fn dates_equal(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(a), Some(b)) => same_millis(a, b),
    _ => false,
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:        Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date: Option<DateTime<Utc>>,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub field_type:  Option<FieldType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options:     Option<Vec<OptionInput>>,
}

impl FieldInput {
  pub fn reference(uuid: Uuid) -> Self {
    Self { uuid: Some(uuid), ..Self::default() }
  }

  /// A `{uuid}`-only input links an existing field without touching it.
  pub fn referenced_uuid(&self) -> Option<Uuid> {
    let bare = self.name.is_none()
      && self.description.is_none()
      && self.public_date.is_none()
      && self.field_type.is_none()
      && self.options.is_none();
    self.uuid.filter(|_| bare)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldView {
  /// Version id; only present on persisted reads.
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id:           Option<Uuid>,
  pub uuid:         Uuid,
  pub updated_at:   DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub persist_date: Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub field:        TemplateField,
}

impl FieldView {
  fn persisted(version: Version<TemplateField>) -> Self {
    Self {
      id:           Some(version.id),
      uuid:         version.uuid,
      updated_at:   version.updated_at,
      persist_date: version.persist_date,
      field:        version.body,
    }
  }

  /// A version rendered as a draft; a persisted one is what the next draft
  /// would start from.
  fn draft(version: Version<TemplateField>) -> Self {
    Self {
      id:           None,
      uuid:         version.uuid,
      updated_at:   version.updated_at,
      persist_date: None,
      field:        version.body,
    }
  }
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

pub(crate) fn resolve(s: &mut Session<'_>, input: FieldInput) -> Result<Resolved> {
  let uuid = match input.uuid {
    Some(uuid) => {
      if !s.exists(DocumentKind::TemplateField, uuid)? {
        return Err(Error::not_found(format!("no template field exists with uuid {uuid}")));
      }
      if !s.has_permission(uuid, PermissionLevel::Edit)? {
        return Err(Error::denied(format!(
          "edit permission is required to update template field {uuid}"
        )));
      }
      uuid
    }
    None => {
      let uuid = Uuid::new_v4();
      s.initialize_permissions(uuid)?;
      uuid
    }
  };

  let previous = s.latest_document::<TemplateField>(uuid)?;

  if input.field_type == Some(FieldType::File) && input.options.is_some() {
    return Err(Error::input("options are not supported for fields of type File"));
  }
  let options = match &input.options {
    Some(given) => {
      let mut existing = HashSet::new();
      if let Some(opts) = previous.as_ref().and_then(|p| p.body.options.as_ref()) {
        options::leaf_uuids(opts, &mut existing);
      }
      Some(options::parse_options(given, &existing)?)
    }
    None => None,
  };

  let body = TemplateField {
    name: input.name.unwrap_or_default(),
    description: input.description.unwrap_or_default(),
    public_date: input.public_date,
    field_type: input.field_type,
    options,
    duplicated_from: previous.and_then(|p| p.body.duplicated_from),
  };

  let differs = match s.latest_persisted::<TemplateField>(uuid)? {
    Some(persisted) => !persisted.body.same_content(&body),
    None => true,
  };
  lifecycle::settle_draft(s, uuid, body, differs)
}

/// Resolve a field nested inside a template.
pub(crate) fn resolve_child(s: &mut Session<'_>, input: FieldInput) -> Result<Resolved> {
  let uuid = input.uuid;
  let outcome = match input.referenced_uuid() {
    Some(uuid) => lifecycle::reference(s, DocumentKind::TemplateField, uuid),
    None => resolve(s, input),
  };
  outcome.or_else(|err| lifecycle::link_unreachable(err, uuid))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// The draft, or the latest persisted version rendered as one. Requires
/// `edit`.
pub(crate) fn draft_view(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<FieldView>> {
  let Some(version) = s.latest_document::<TemplateField>(uuid)? else {
    return Ok(None);
  };
  if !s.has_permission(uuid, PermissionLevel::Edit)? {
    return Err(Error::denied(format!(
      "edit permission is required to read the draft of template field {uuid}"
    )));
  }
  Ok(Some(FieldView::draft(version)))
}

/// A persisted version, by version id, if the viewer may see it.
pub(crate) fn view_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<FieldView>> {
  let Some(version) = s.version::<TemplateField>(id)?.filter(|v| !v.is_draft()) else {
    return Ok(None);
  };
  if !s.can_view::<TemplateField>(version.uuid)? {
    return Err(Error::denied(format!(
      "view permission is required for template field {}",
      version.uuid
    )));
  }
  Ok(Some(FieldView::persisted(version)))
}

/// The latest persisted version of every public template field.
pub fn all_public_fields(s: &mut Session<'_>) -> Result<Vec<FieldView>> {
  let mut fields = Vec::new();
  for uuid in s.public_uuids(DocumentKind::TemplateField)? {
    if let Some(version) = s.latest_persisted::<TemplateField>(uuid)? {
      fields.push(FieldView::persisted(version));
    }
  }
  Ok(fields)
}

// ─── Persist ─────────────────────────────────────────────────────────────────

/// Persist a field reached from a template persist and return the version id
/// the template should point at.
pub(crate) fn persist_recursor(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
  let Some(draft) = s.draft::<TemplateField>(uuid)? else {
    return s
      .latest_persisted_meta(DocumentKind::TemplateField, uuid)?
      .map(|v| v.id)
      .ok_or_else(|| Error::not_found(format!("template field {uuid} does not exist")));
  };
  if !s.has_permission(uuid, PermissionLevel::Admin)? {
    return Err(Error::denied(format!(
      "admin permission is required to persist template field {uuid}"
    )));
  }
  let body = draft.body.clone();
  Ok(s.mark_persisted(draft, body)?.id)
}

// ─── Duplicate ───────────────────────────────────────────────────────────────

/// Copy one persisted field version into a fresh draft owned by the viewer.
pub(crate) fn duplicate_version(
  s: &mut Session<'_>,
  version: Version<TemplateField>,
) -> Result<Uuid> {
  if !s.can_view::<TemplateField>(version.uuid)? {
    return Err(Error::denied(format!(
      "view permission is required to duplicate template field {}",
      version.uuid
    )));
  }
  let uuid = Uuid::new_v4();
  s.initialize_permissions(uuid)?;
  let body = TemplateField {
    public_date: None,
    duplicated_from: Some(version.uuid),
    ..version.body
  };
  s.upsert_draft(uuid, body)?;
  Ok(uuid)
}

// ─── Document ────────────────────────────────────────────────────────────────

impl Document for TemplateField {
  type Input = FieldInput;
  type View = FieldView;

  fn create(s: &mut Session<'_>, mut input: FieldInput) -> Result<Uuid> {
    input.uuid = None;
    Ok(resolve(s, input)?.uuid)
  }

  fn update(s: &mut Session<'_>, uuid: Uuid, mut input: FieldInput) -> Result<()> {
    input.uuid = Some(uuid);
    resolve(s, input).map(|_| ())
  }

  fn draft_get(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<FieldView>> {
    draft_view(s, uuid)
  }

  fn draft_delete(s: &mut Session<'_>, uuid: Uuid) -> Result<()> {
    lifecycle::delete_draft_guarded(
      s,
      Self::KIND,
      uuid,
      uuid,
      PermissionLevel::Edit,
    )
  }

  fn persist(
    s: &mut Session<'_>,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()> {
    let draft = lifecycle::require_persistable::<Self>(s, uuid, uuid)?;
    lifecycle::check_last_update(last_update, draft.updated_at)?;
    let body = draft.body.clone();
    s.mark_persisted(draft, body)?;
    tracing::info!(%uuid, "template field persisted");
    Ok(())
  }

  fn persisted_before(
    s: &mut Session<'_>,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<FieldView>> {
    let Some(version) = s.persisted_before::<Self>(uuid, at)? else {
      return Ok(None);
    };
    if !s.can_view::<Self>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for template field {uuid}"
      )));
    }
    Ok(Some(FieldView::persisted(version)))
  }

  fn persisted_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<FieldView>> {
    view_version(s, id)
  }

  fn last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
    let draft = s.draft::<Self>(uuid)?;
    let persisted = s.latest_persisted::<Self>(uuid)?;
    if let Some(draft) = &draft {
      if s.has_permission(uuid, PermissionLevel::Edit)? {
        return Ok(draft.updated_at);
      }
    }
    let Some(persisted) = persisted else {
      return Err(match draft {
        Some(_) => Error::denied(format!(
          "no permission for the draft of template field {uuid}, and no persisted version exists"
        )),
        None => Error::not_found(format!("no template field exists with uuid {uuid}")),
      });
    };
    if !s.can_view::<Self>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for template field {uuid}"
      )));
    }
    Ok(persisted.updated_at)
  }

  fn duplicate(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
    let Some(version) = s.latest_persisted::<Self>(uuid)? else {
      return Err(Error::not_found(format!("persisted template field {uuid} does not exist")));
    };
    duplicate_version(s, version)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_equality_ignores_option_order_and_provenance() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let left = TemplateField {
      name: "colour".into(),
      options: Some(vec![
        FieldOption::Leaf { name: "red".into(), uuid: a },
        FieldOption::Leaf { name: "blue".into(), uuid: b },
      ]),
      ..TemplateField::default()
    };
    let mut right = left.clone();
    right.options.as_mut().unwrap().reverse();
    right.duplicated_from = Some(Uuid::new_v4());
    assert!(left.same_content(&right));

    right.description = "changed".into();
    assert!(!left.same_content(&right));
  }

  #[test]
  fn bare_uuid_input_is_a_reference() {
    let id = Uuid::new_v4();
    assert_eq!(FieldInput::reference(id).referenced_uuid(), Some(id));
    let named = FieldInput { name: Some("x".into()), ..FieldInput::reference(id) };
    assert_eq!(named.referenced_uuid(), None);
  }

  #[test]
  fn type_serializes_under_its_wire_name() {
    let field = TemplateField { field_type: Some(FieldType::Image), ..Default::default() };
    let json = serde_json::to_value(&field).unwrap();
    assert_eq!(json["type"], "Image");
  }
}
