//! Templates: named schemas built from fields, related templates, and
//! subscriptions to specific persisted template versions.
//!
//! | Reference              | In a draft        | Once persisted |
//! |------------------------|-------------------|----------------|
//! | `fields`               | field uuids       | version ids    |
//! | `related_templates`    | template uuids    | version ids    |
//! | `subscribed_templates` | version ids       | version ids    |

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{Body, DocumentKind, Version, has_duplicates, same_set},
  field::{self, FieldInput, FieldView, TemplateField, dates_equal},
  lifecycle::{self, Document, Resolved},
  permission::PermissionLevel,
  projection::{self, Linked},
  session::Session,
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
  #[serde(default)]
  pub name:                 String,
  #[serde(default)]
  pub description:          String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:          Option<DateTime<Utc>>,
  #[serde(default)]
  pub fields:               Vec<Uuid>,
  #[serde(default)]
  pub related_templates:    Vec<Uuid>,
  #[serde(default)]
  pub subscribed_templates: Vec<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from:      Option<Uuid>,
}

impl Body for Template {
  const KIND: DocumentKind = DocumentKind::Template;

  fn public_date(&self) -> Option<DateTime<Utc>> { self.public_date }
}

impl Template {
  /// Content equality between two draft-shaped bodies.
  fn same_content(&self, other: &Self) -> bool {
    self.name == other.name
      && self.description == other.description
      && dates_equal(self.public_date, other.public_date)
      && same_set(&self.fields, &other.fields)
      && same_set(&self.related_templates, &other.related_templates)
      && same_set(&self.subscribed_templates, &other.subscribed_templates)
  }
}

/// A subscription names one persisted version of another template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedTemplate {
  #[serde(rename = "_id")]
  pub id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateInput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uuid:                 Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:                 Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:          Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fields:               Option<Vec<FieldInput>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub related_templates:    Option<Vec<TemplateInput>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subscribed_templates: Option<Vec<SubscribedTemplate>>,
}

impl TemplateInput {
  pub fn reference(uuid: Uuid) -> Self {
    Self { uuid: Some(uuid), ..Self::default() }
  }

  pub fn referenced_uuid(&self) -> Option<Uuid> {
    let bare = self.name.is_none()
      && self.description.is_none()
      && self.public_date.is_none()
      && self.fields.is_none()
      && self.related_templates.is_none()
      && self.subscribed_templates.is_none();
    self.uuid.filter(|_| bare)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateView {
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id:                   Option<Uuid>,
  pub uuid:                 Uuid,
  pub updated_at:           DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub persist_date:         Option<DateTime<Utc>>,
  pub name:                 String,
  pub description:          String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub public_date:          Option<DateTime<Utc>>,
  pub fields:               Vec<Linked<FieldView>>,
  pub related_templates:    Vec<Linked<TemplateView>>,
  pub subscribed_templates: Vec<Linked<TemplateView>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duplicated_from:      Option<Uuid>,
}

impl TemplateView {
  fn shell(version: &Version<Template>, persisted: bool) -> Self {
    Self {
      id:                   persisted.then_some(version.id),
      uuid:                 version.uuid,
      updated_at:           version.updated_at,
      persist_date:         if persisted { version.persist_date } else { None },
      name:                 version.body.name.clone(),
      description:          version.body.description.clone(),
      public_date:          version.body.public_date,
      fields:               Vec::new(),
      related_templates:    Vec::new(),
      subscribed_templates: Vec::new(),
      duplicated_from:      version.body.duplicated_from,
    }
  }
}

// ─── Graph helpers ───────────────────────────────────────────────────────────

/// Field and related-template uuids of a version, whichever shape it is in.
fn child_uuids(
  s: &Session<'_>,
  version: &Version<Template>,
) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
  if version.is_draft() {
    return Ok((
      version.body.fields.clone(),
      version.body.related_templates.clone(),
    ));
  }
  Ok((
    s.uuids_for_versions(
      DocumentKind::TemplateField,
      version.uuid,
      &version.body.fields,
    )?,
    s.uuids_for_versions(
      DocumentKind::Template,
      version.uuid,
      &version.body.related_templates,
    )?,
  ))
}

enum Node {
  /// Whatever `uuid` currently is: its draft, or its latest persisted version.
  Latest(Uuid),
  /// One specific version.
  Pinned(Uuid),
}

/// Every template uuid reachable from `start` through related and subscribed
/// edges, `start` included.
fn reachable(s: &Session<'_>, start: Node) -> Result<HashSet<Uuid>> {
  let mut reached = HashSet::new();
  let mut latest_seen = HashSet::new();
  let mut pinned_seen = HashSet::new();
  let mut stack = vec![start];
  while let Some(node) = stack.pop() {
    let version = match node {
      Node::Latest(uuid) => {
        if !latest_seen.insert(uuid) {
          continue;
        }
        reached.insert(uuid);
        s.latest_document::<Template>(uuid)?
      }
      Node::Pinned(id) => {
        if !pinned_seen.insert(id) {
          continue;
        }
        s.version::<Template>(id)?
      }
    };
    let Some(version) = version else { continue };
    reached.insert(version.uuid);
    if version.is_draft() {
      stack.extend(version.body.related_templates.iter().copied().map(Node::Latest));
    } else {
      stack.extend(version.body.related_templates.iter().copied().map(Node::Pinned));
    }
    stack.extend(version.body.subscribed_templates.iter().copied().map(Node::Pinned));
  }
  Ok(reached)
}

fn reject_cycle(reached: &HashSet<Uuid>, ancestors: &HashSet<Uuid>) -> Result<()> {
  match reached.iter().find(|uuid| ancestors.contains(uuid)) {
    Some(uuid) => Err(Error::input(format!(
      "circular reference to template {uuid} is not permitted"
    ))),
    None => Ok(()),
  }
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

fn resolve(
  s: &mut Session<'_>,
  input: TemplateInput,
  ancestors: &mut HashSet<Uuid>,
) -> Result<Resolved> {
  let uuid = match input.uuid {
    Some(uuid) => {
      if !s.exists(DocumentKind::Template, uuid)? {
        return Err(Error::not_found(format!("no template exists with uuid {uuid}")));
      }
      if !s.has_permission(uuid, PermissionLevel::Edit)? {
        return Err(Error::denied(format!(
          "edit permission is required to update template {uuid}"
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

  if !ancestors.insert(uuid) {
    return Err(Error::input(format!(
      "template {uuid} references itself; circular references are not permitted"
    )));
  }
  let outcome = resolve_node(s, uuid, input, ancestors);
  ancestors.remove(&uuid);
  outcome
}

fn resolve_node(
  s: &mut Session<'_>,
  uuid: Uuid,
  input: TemplateInput,
  ancestors: &mut HashSet<Uuid>,
) -> Result<Resolved> {
  let mut changed = false;

  let mut fields = Vec::new();
  for child in input.fields.unwrap_or_default() {
    let resolved = field::resolve_child(s, child)?;
    changed |= resolved.changed;
    fields.push(resolved.uuid);
  }
  if has_duplicates(&fields) {
    return Err(Error::input("each template may only include a template field once"));
  }

  let mut related_templates = Vec::new();
  for child in input.related_templates.unwrap_or_default() {
    let resolved = resolve_child(s, child, ancestors)?;
    changed |= resolved.changed;
    related_templates.push(resolved.uuid);
  }
  if has_duplicates(&related_templates) {
    return Err(Error::input("each template may only include a related template once"));
  }

  let subscribed_templates = resolve_subscribed(
    s,
    uuid,
    input.subscribed_templates.unwrap_or_default(),
    ancestors,
  )?;

  let previous = s.latest_document::<Template>(uuid)?;
  let body = Template {
    name: input.name.unwrap_or_default(),
    description: input.description.unwrap_or_default(),
    public_date: input.public_date,
    fields,
    related_templates,
    subscribed_templates,
    duplicated_from: previous.and_then(|p| p.body.duplicated_from),
  };

  let differs = changed || differs_from_persisted(s, uuid, &body)?;
  lifecycle::settle_draft(s, uuid, body, differs)
}

fn resolve_child(
  s: &mut Session<'_>,
  input: TemplateInput,
  ancestors: &mut HashSet<Uuid>,
) -> Result<Resolved> {
  // Children linked without being resolved here never had their edges
  // walked, so they are checked against the ancestors separately.
  if let Some(uuid) = input.referenced_uuid() {
    let resolved = lifecycle::reference(s, DocumentKind::Template, uuid)
      .or_else(|err| lifecycle::link_unreachable(err, Some(uuid)))?;
    reject_cycle(&reachable(s, Node::Latest(uuid))?, ancestors)?;
    return Ok(resolved);
  }
  let given = input.uuid;
  match resolve(s, input, ancestors) {
    Ok(resolved) => Ok(resolved),
    Err(err) => {
      let linked = lifecycle::link_unreachable(err, given)?;
      reject_cycle(&reachable(s, Node::Latest(linked.uuid))?, ancestors)?;
      Ok(linked)
    }
  }
}

fn resolve_subscribed(
  s: &Session<'_>,
  parent: Uuid,
  input: Vec<SubscribedTemplate>,
  ancestors: &HashSet<Uuid>,
) -> Result<Vec<Uuid>> {
  let mut previous = HashSet::new();
  if let Some(persisted) = s.latest_persisted::<Template>(parent)? {
    previous.extend(persisted.body.subscribed_templates);
  }
  if let Some(draft) = s.draft::<Template>(parent)? {
    previous.extend(draft.body.subscribed_templates);
  }

  let mut seen = HashSet::new();
  let mut ids = Vec::with_capacity(input.len());
  for SubscribedTemplate { id } in input {
    let Some(version) = s.version::<Template>(id)?.filter(|v| !v.is_draft()) else {
      return Err(Error::input(format!(
        "subscribed template with _id {id} does not exist"
      )));
    };
    if !previous.contains(&id) {
      let latest = s.latest_persisted_meta(DocumentKind::Template, version.uuid)?;
      if latest.map(|v| v.id) != Some(id) {
        return Err(Error::input(format!(
          "subscribed template {id} must be the version already subscribed to or the latest \
           persisted version"
        )));
      }
    }
    if !seen.insert(version.uuid) {
      return Err(Error::input(format!(
        "template {} is subscribed more than once; each template may only be subscribed once",
        version.uuid
      )));
    }
    reject_cycle(&reachable(s, Node::Pinned(id))?, ancestors)?;
    ids.push(id);
  }
  Ok(ids)
}

/// Compare a freshly resolved body against the latest persisted version,
/// counting children persisted after it as a change.
fn differs_from_persisted(s: &Session<'_>, uuid: Uuid, body: &Template) -> Result<bool> {
  let Some(persisted) = s.latest_persisted::<Template>(uuid)? else {
    return Ok(true);
  };
  let (fields, related_templates) = child_uuids(s, &persisted)?;
  let as_draft = Template { fields, related_templates, ..persisted.body.clone() };
  if !body.same_content(&as_draft) {
    return Ok(true);
  }

  let Some(since) = persisted.persist_date else {
    return Ok(true);
  };
  for field in &body.fields {
    if s
      .latest_persist_date(DocumentKind::TemplateField, *field)?
      .is_some_and(|d| d > since)
    {
      return Ok(true);
    }
  }
  for related in &body.related_templates {
    if s
      .latest_persist_date(DocumentKind::Template, *related)?
      .is_some_and(|d| d > since)
    {
      return Ok(true);
    }
  }
  Ok(false)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

fn draft_view(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<TemplateView>> {
  let Some(version) = s.latest_document::<Template>(uuid)? else {
    return Ok(None);
  };
  if !s.has_permission(uuid, PermissionLevel::Edit)? {
    return Err(Error::denied(format!(
      "edit permission is required to read the draft of template {uuid}"
    )));
  }

  let (field_uuids, related_uuids) = child_uuids(s, &version)?;
  let mut view = TemplateView::shell(&version, false);

  let mut kept_fields = Vec::with_capacity(field_uuids.len());
  for child in &field_uuids {
    let child = *child;
    let linked = projection::draft_child(
      s,
      child,
      |s| field::draft_view(s, child),
      |s| TemplateField::latest_persisted(s, child),
    )?;
    if let Some(linked) = linked {
      view.fields.push(linked);
      kept_fields.push(child);
    }
  }

  let mut kept_related = Vec::with_capacity(related_uuids.len());
  for child in &related_uuids {
    let child = *child;
    let linked = projection::draft_child(
      s,
      child,
      |s| draft_view(s, child),
      |s| Template::latest_persisted(s, child),
    )?;
    match linked {
      Some(linked) => {
        view.related_templates.push(linked);
        kept_related.push(child);
      }
      None => tracing::debug!(
        template = %uuid, related = %child,
        "dropping reference to missing template"
      ),
    }
  }

  for id in &version.body.subscribed_templates {
    if let Some(linked) = linked_version(s, *id)? {
      view.subscribed_templates.push(linked);
    }
  }

  // Drop dangling pointers from the stored draft.
  if version.is_draft()
    && (kept_fields.len() != field_uuids.len()
      || kept_related.len() != related_uuids.len())
  {
    let body = Template {
      fields: kept_fields,
      related_templates: kept_related,
      ..version.body.clone()
    };
    let rewritten = s.upsert_draft(uuid, body)?;
    view.updated_at = rewritten.updated_at;
  }

  Ok(Some(view))
}

/// A persisted version with its whole reference tree, projected for the
/// viewer. The root must already have been checked.
fn persisted_tree(s: &mut Session<'_>, version: Version<Template>) -> Result<TemplateView> {
  let mut view = TemplateView::shell(&version, true);
  for id in &version.body.fields {
    let Some(child) = s.version::<TemplateField>(*id)? else {
      tracing::warn!(
        template = %version.uuid, version_id = %id,
        "persisted template points at a missing field version"
      );
      continue;
    };
    let child_uuid = child.uuid;
    match field::view_version(s, *id) {
      Ok(Some(field)) => view.fields.push(Linked::Full(field)),
      Ok(None) => {}
      Err(err) if err.is_denied() => view.fields.push(Linked::stub(child_uuid)),
      Err(err) => return Err(err),
    }
  }
  for id in &version.body.related_templates {
    if let Some(linked) = linked_version(s, *id)? {
      view.related_templates.push(linked);
    }
  }
  for id in &version.body.subscribed_templates {
    if let Some(linked) = linked_version(s, *id)? {
      view.subscribed_templates.push(linked);
    }
  }
  Ok(view)
}

/// A linked persisted template version: full when the viewer may see it,
/// otherwise a stub.
fn linked_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<Linked<TemplateView>>> {
  let Some(version) = s.version::<Template>(id)? else {
    tracing::warn!(version_id = %id, "reference to a missing template version");
    return Ok(None);
  };
  if !s.can_view::<Template>(version.uuid)? {
    return Ok(Some(Linked::stub(version.uuid)));
  }
  Ok(Some(Linked::Full(persisted_tree(s, version)?)))
}

// ─── Persist ─────────────────────────────────────────────────────────────────

/// Persist `uuid` if it has a draft the viewer may persist and return the
/// version id its parent should point at.
fn persist_recursor(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
  let persisted = s.latest_persisted_meta(DocumentKind::Template, uuid)?;
  let Some(draft) = s.draft::<Template>(uuid)? else {
    let Some(persisted) = persisted else {
      return Err(Error::not_found(format!("template {uuid} does not exist")));
    };
    if !s.can_view::<Template>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required to link template {uuid}"
      )));
    }
    return Ok(persisted.id);
  };

  if !s.has_permission(uuid, PermissionLevel::Admin)? {
    let Some(persisted) = persisted else {
      return Err(Error::input(format!(
        "no permission to persist the draft of template {uuid}, and no persisted version exists"
      )));
    };
    if !s.can_view::<Template>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required to link template {uuid}"
      )));
    }
    tracing::debug!(%uuid, "skipping template draft without admin permission");
    return Ok(persisted.id);
  }

  let mut fields = Vec::with_capacity(draft.body.fields.len());
  for child in &draft.body.fields {
    let id = match field::persist_recursor(s, *child) {
      Ok(id) => id,
      Err(err) => lifecycle::fall_back_to_persisted(s, DocumentKind::TemplateField, *child, err)?,
    };
    fields.push(id);
  }

  let mut related_templates = Vec::with_capacity(draft.body.related_templates.len());
  for child in &draft.body.related_templates {
    let id = match persist_recursor(s, *child) {
      Ok(id) => id,
      Err(err) => lifecycle::fall_back_to_persisted(s, DocumentKind::Template, *child, err)?,
    };
    related_templates.push(id);
  }

  let body = Template { fields, related_templates, ..draft.body.clone() };
  Ok(s.mark_persisted(draft, body)?.id)
}

fn effective_last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
  let Some(version) = s.latest_document::<Template>(uuid)? else {
    return Err(Error::not_found(format!("no template exists with uuid {uuid}")));
  };
  if !s.has_permission(uuid, PermissionLevel::Edit)? {
    let Some(persisted) = s.latest_persisted::<Template>(uuid)? else {
      return Err(Error::denied(format!(
        "no permission for the draft of template {uuid}, and no persisted version exists"
      )));
    };
    if !s.can_view::<Template>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for template {uuid}"
      )));
    }
    return Ok(persisted.updated_at);
  }

  let mut last = version.updated_at;
  let (fields, related) = child_uuids(s, &version)?;
  for child in fields {
    match TemplateField::last_update(s, child) {
      Ok(at) => last = last.max(at),
      Err(err) if err.is_unreachable() => {}
      Err(err) => return Err(err),
    }
  }
  for child in related {
    match effective_last_update(s, child) {
      Ok(at) => last = last.max(at),
      Err(err) if err.is_unreachable() => {}
      Err(err) => return Err(err),
    }
  }
  Ok(last)
}

// ─── Duplicate ───────────────────────────────────────────────────────────────

fn duplicate_version(s: &mut Session<'_>, version: Version<Template>) -> Result<Uuid> {
  if !s.can_view::<Template>(version.uuid)? {
    return Err(Error::denied(format!(
      "view permission is required to duplicate template {}",
      version.uuid
    )));
  }
  let uuid = Uuid::new_v4();
  s.initialize_permissions(uuid)?;

  let mut fields = Vec::new();
  for id in &version.body.fields {
    let Some(child) = s.version::<TemplateField>(*id)? else { continue };
    match field::duplicate_version(s, child) {
      Ok(copy) => fields.push(copy),
      Err(err) if err.is_unreachable() => {
        tracing::debug!(
          template = %version.uuid, field_version = %id,
          "not duplicating unviewable field"
        );
      }
      Err(err) => return Err(err),
    }
  }

  let mut related_templates = Vec::new();
  for id in &version.body.related_templates {
    let Some(child) = s.version::<Template>(*id)? else { continue };
    match duplicate_version(s, child) {
      Ok(copy) => related_templates.push(copy),
      Err(err) if err.is_unreachable() => {
        tracing::debug!(
          template = %version.uuid, related_version = %id,
          "not duplicating unviewable template"
        );
      }
      Err(err) => return Err(err),
    }
  }

  let body = Template {
    public_date: None,
    fields,
    related_templates,
    duplicated_from: Some(version.uuid),
    ..version.body
  };
  s.upsert_draft(uuid, body)?;
  Ok(uuid)
}

// ─── Document ────────────────────────────────────────────────────────────────

impl Document for Template {
  type Input = TemplateInput;
  type View = TemplateView;

  fn create(s: &mut Session<'_>, mut input: TemplateInput) -> Result<Uuid> {
    input.uuid = None;
    Ok(resolve(s, input, &mut HashSet::new())?.uuid)
  }

  fn update(s: &mut Session<'_>, uuid: Uuid, mut input: TemplateInput) -> Result<()> {
    input.uuid = Some(uuid);
    resolve(s, input, &mut HashSet::new()).map(|_| ())
  }

  fn draft_get(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<TemplateView>> {
    draft_view(s, uuid)
  }

  fn draft_delete(s: &mut Session<'_>, uuid: Uuid) -> Result<()> {
    lifecycle::delete_draft_guarded(s, Self::KIND, uuid, uuid, PermissionLevel::Edit)
  }

  fn persist(
    s: &mut Session<'_>,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()> {
    lifecycle::require_persistable::<Self>(s, uuid, uuid)?;
    let current = effective_last_update(s, uuid)?;
    lifecycle::check_last_update(last_update, current)?;
    let id = persist_recursor(s, uuid)?;
    tracing::info!(%uuid, version_id = %id, "template persisted");
    Ok(())
  }

  fn persisted_before(
    s: &mut Session<'_>,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<TemplateView>> {
    let Some(version) = s.persisted_before::<Self>(uuid, at)? else {
      return Ok(None);
    };
    if !s.can_view::<Self>(uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for template {uuid}"
      )));
    }
    persisted_tree(s, version).map(Some)
  }

  fn persisted_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<TemplateView>> {
    let Some(version) = s.version::<Self>(id)?.filter(|v| !v.is_draft()) else {
      return Ok(None);
    };
    if !s.can_view::<Self>(version.uuid)? {
      return Err(Error::denied(format!(
        "view permission is required for template {}",
        version.uuid
      )));
    }
    persisted_tree(s, version).map(Some)
  }

  fn last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>> {
    effective_last_update(s, uuid)
  }

  fn duplicate(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid> {
    let Some(version) = s.latest_persisted::<Self>(uuid)? else {
      return Err(Error::not_found(format!("persisted template {uuid} does not exist")));
    };
    duplicate_version(s, version)
  }
}
