//! The draft lifecycle every document kind goes through.
//!
//! Input is resolved into a draft body, diffed against the latest persisted
//! version, and either written as the draft or collapsed back onto the
//! persisted version. Persisting freezes the draft. Deleting is only possible
//! while a draft exists.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{Body, DocumentKind, Version, same_millis},
  permission::PermissionLevel,
  session::Session,
};

/// Outcome of resolving one node of an input tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
  pub uuid:    Uuid,
  /// The node now has a draft that differs from its persisted version.
  pub changed: bool,
}

impl Resolved {
  pub fn changed(uuid: Uuid) -> Self { Self { uuid, changed: true } }

  pub fn unchanged(uuid: Uuid) -> Self { Self { uuid, changed: false } }
}

// ─── Document trait ──────────────────────────────────────────────────────────

/// The uniform operation set exposed for each document kind.
///
/// Every operation runs against a [`Session`], so a caller composing several
/// of them keeps one atomic scope.
pub trait Document: Body {
  /// Nested create/update input rooted at this kind.
  type Input: DeserializeOwned + Send + 'static;
  /// Read model returned by draft and persisted reads.
  type View: Serialize + Send + 'static;

  fn create(s: &mut Session<'_>, input: Self::Input) -> Result<Uuid>;

  /// Re-resolve `uuid` from `input`. A no-op when nothing changed.
  fn update(s: &mut Session<'_>, uuid: Uuid, input: Self::Input) -> Result<()>;

  /// The draft (materialized from the latest persisted version when there
  /// is none), projected for the viewer.
  fn draft_get(s: &mut Session<'_>, uuid: Uuid) -> Result<Option<Self::View>>;

  fn draft_delete(s: &mut Session<'_>, uuid: Uuid) -> Result<()>;

  /// Persist the draft and every drafted descendant the viewer may persist.
  /// `last_update` must match [`Document::last_update`].
  fn persist(
    s: &mut Session<'_>,
    uuid: Uuid,
    last_update: DateTime<Utc>,
  ) -> Result<()>;

  fn persisted_before(
    s: &mut Session<'_>,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<Self::View>>;

  /// One persisted version by its version id. Drafts are not returned.
  fn persisted_version(s: &mut Session<'_>, id: Uuid) -> Result<Option<Self::View>>;

  /// The concurrency token for [`Document::persist`].
  fn last_update(s: &mut Session<'_>, uuid: Uuid) -> Result<DateTime<Utc>>;

  /// Deep-copy the latest persisted version into fresh drafts.
  fn duplicate(s: &mut Session<'_>, uuid: Uuid) -> Result<Uuid>;

  fn draft_existing(s: &mut Session<'_>, uuid: Uuid) -> Result<bool> {
    s.has_draft(Self::KIND, uuid)
  }

  fn latest_persisted(
    s: &mut Session<'_>,
    uuid: Uuid,
  ) -> Result<Option<Self::View>> {
    let now = s.now();
    Self::persisted_before(s, uuid, now)
  }

  fn all_public_uuids(s: &mut Session<'_>) -> Result<Vec<Uuid>> {
    s.public_uuids(Self::KIND)
  }

  fn all_viewable_uuids(s: &mut Session<'_>) -> Result<Vec<Uuid>> {
    s.viewable_uuids(Self::KIND)
  }
}

// ─── Shared steps ────────────────────────────────────────────────────────────

/// Write `body` as the draft of `uuid`, or, when it is no different from the
/// latest persisted version, discard any draft instead.
pub(crate) fn settle_draft<B: Body>(
  s: &Session<'_>,
  uuid: Uuid,
  body: B,
  differs: bool,
) -> Result<Resolved> {
  if !differs {
    if s.delete_draft(B::KIND, uuid)? {
      tracing::debug!(kind = %B::KIND, %uuid, "draft matches persisted version; discarded");
    }
    return Ok(Resolved::unchanged(uuid));
  }
  s.upsert_draft(uuid, body)?;
  Ok(Resolved::changed(uuid))
}

/// Resolve a `{uuid}`-only child: it must exist and is linked untouched.
pub(crate) fn reference(
  s: &Session<'_>,
  kind: DocumentKind,
  uuid: Uuid,
) -> Result<Resolved> {
  if !s.exists(kind, uuid)? {
    return Err(Error::not_found(format!("no {kind} exists with uuid {uuid}")));
  }
  Ok(Resolved { uuid, changed: s.has_draft(kind, uuid)? })
}

/// How a parent treats a child that failed to resolve: a missing child is
/// bad input for the parent; a child the viewer may not edit is linked as-is.
pub(crate) fn link_unreachable(err: Error, uuid: Option<Uuid>) -> Result<Resolved> {
  match (err, uuid) {
    (Error::NotFound(msg), _) => Err(Error::Input(msg)),
    (Error::PermissionDenied(_), Some(uuid)) => Ok(Resolved::unchanged(uuid)),
    (err, _) => Err(err),
  }
}

/// The error for persisting a uuid that has no draft.
pub(crate) fn nothing_to_persist(
  s: &Session<'_>,
  kind: DocumentKind,
  uuid: Uuid,
) -> Error {
  match s.exists(kind, uuid) {
    Ok(true) => Error::input("no changes to persist"),
    Ok(false) => Error::not_found(format!("{kind} with uuid {uuid} does not exist")),
    Err(err) => err,
  }
}

pub(crate) fn check_last_update(
  submitted: DateTime<Utc>,
  actual: DateTime<Utc>,
) -> Result<()> {
  if same_millis(submitted, actual) {
    return Ok(());
  }
  Err(Error::input(format!(
    "the last update submitted ({}) does not match the current one ({}); \
     fetch the draft again before persisting",
    submitted.to_rfc3339(),
    actual.to_rfc3339()
  )))
}

/// Delete the draft of `uuid`, authorized by `level` on `guard` (the document
/// itself, or the document its permissions are inherited from). A document
/// that was never persisted loses its ledger entries too.
pub(crate) fn delete_draft_guarded(
  s: &mut Session<'_>,
  kind: DocumentKind,
  uuid: Uuid,
  guard: Uuid,
  level: PermissionLevel,
) -> Result<()> {
  if !s.has_draft(kind, uuid)? {
    return Err(Error::not_found(format!("no {kind} draft exists with uuid {uuid}")));
  }
  if !s.has_permission(guard, level)? {
    return Err(Error::denied(format!(
      "{} permission is required to delete the draft of {kind} {uuid}",
      level.as_str()
    )));
  }
  s.delete_draft(kind, uuid)?;
  if guard == uuid && !s.exists(kind, uuid)? {
    s.delete_permissions(uuid)?;
  }
  Ok(())
}

/// Shared guard for the root of a persist: there is a draft and the viewer
/// holds `admin` on `guard`.
pub(crate) fn require_persistable<B: Body>(
  s: &mut Session<'_>,
  uuid: Uuid,
  guard: Uuid,
) -> Result<Version<B>> {
  let Some(draft) = s.draft::<B>(uuid)? else {
    return Err(nothing_to_persist(s, B::KIND, uuid));
  };
  if !s.has_permission(guard, PermissionLevel::Admin)? {
    return Err(Error::denied(format!(
      "admin permission is required to persist {} {uuid}",
      B::KIND
    )));
  }
  Ok(draft)
}

/// A child that could not be persisted: dangling pointers fail the persist,
/// children the viewer may not persist are linked at their latest persisted
/// version.
pub(crate) fn fall_back_to_persisted(
  s: &Session<'_>,
  kind: DocumentKind,
  uuid: Uuid,
  err: Error,
) -> Result<Uuid> {
  match err {
    Error::NotFound(_) => Err(Error::input(format!(
      "reference to {kind} {uuid} within this draft is invalid; fetch or update the draft to \
       cleanse it"
    ))),
    Error::PermissionDenied(_) => s
      .latest_persisted_meta(kind, uuid)?
      .map(|v| v.id)
      .ok_or_else(|| {
        Error::input(format!(
          "no permission to persist the draft of {kind} {uuid}, and no persisted version exists"
        ))
      }),
    err => Err(err),
  }
}
