//! Permission-filtered rendering of linked documents.
//!
//! Every reference edge in a read response is a [`Linked`]: either the full
//! child view, or a substitute telling the viewer why they only get the
//! identifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, session::Session};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linked<T> {
  Full(T),
  /// The viewer may not read the child at all.
  NoPermissions {
    uuid:           Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset_uuid:   Option<Uuid>,
    no_permissions: bool,
  },
  /// The draft points at a child that no longer exists.
  Deleted { uuid: Uuid, deleted: bool },
  /// Identifier only.
  Stub { uuid: Uuid },
}

impl<T> Linked<T> {
  pub fn stub(uuid: Uuid) -> Self { Self::Stub { uuid } }

  pub fn no_permissions(uuid: Uuid) -> Self {
    Self::NoPermissions { uuid, dataset_uuid: None, no_permissions: true }
  }

  pub fn deleted(uuid: Uuid) -> Self { Self::Deleted { uuid, deleted: true } }

  /// Attach the owning dataset to a `no_permissions` substitute; records use
  /// this so a viewer can still tell where the hidden record lives.
  pub fn in_dataset(self, dataset: Uuid) -> Self {
    match self {
      Self::NoPermissions { uuid, no_permissions, .. } => Self::NoPermissions {
        uuid,
        dataset_uuid: Some(dataset),
        no_permissions,
      },
      other => other,
    }
  }

  pub fn full(&self) -> Option<&T> {
    match self {
      Self::Full(view) => Some(view),
      _ => None,
    }
  }

  pub fn is_full(&self) -> bool { matches!(self, Self::Full(_)) }

  pub fn is_stub(&self) -> bool { matches!(self, Self::Stub { .. }) }
}

/// Render a child of a draft. The child's own draft read is tried first;
/// when that is denied, its latest persisted version (if the viewer may see
/// it) stands in, and failing that a bare stub.
///
/// `Ok(None)` means the child no longer exists at all.
pub(crate) fn draft_child<T>(
  s: &mut Session<'_>,
  uuid: Uuid,
  draft: impl FnOnce(&mut Session<'_>) -> Result<Option<T>>,
  persisted: impl FnOnce(&mut Session<'_>) -> Result<Option<T>>,
) -> Result<Option<Linked<T>>> {
  match draft(s) {
    Ok(Some(view)) => Ok(Some(Linked::Full(view))),
    Ok(None) => Ok(None),
    Err(Error::PermissionDenied(_)) => match persisted(s) {
      Ok(Some(view)) => Ok(Some(Linked::Full(view))),
      Ok(None) => Ok(Some(Linked::stub(uuid))),
      Err(err) if err.is_unreachable() => {
        Ok(Some(Linked::no_permissions(uuid)))
      }
      Err(err) => Err(err),
    },
    Err(err) => Err(err),
  }
}
