//! The permission ledger: per-document, per-user access levels.
//!
//! Levels are ordered `admin > edit > view`; holding a level implies every
//! lower one. Global admins and super-users pass every check.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  document::{Body, DocumentKind, is_public},
  session::Session,
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
  View,
  Edit,
  Admin,
}

impl PermissionLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::View => "view",
      Self::Edit => "edit",
      Self::Admin => "admin",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "view" => Some(Self::View),
      "edit" => Some(Self::Edit),
      "admin" => Some(Self::Admin),
      _ => None,
    }
  }
}

/// Who is asking. Passed explicitly into every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
  /// `None` for anonymous requests.
  pub user_id:  Option<Uuid>,
  pub is_admin: bool,
  pub is_super: bool,
}

impl Viewer {
  pub fn user(user_id: Uuid) -> Self {
    Self { user_id: Some(user_id), ..Self::default() }
  }

  pub fn anonymous() -> Self { Self::default() }

  pub fn is_global(&self) -> bool { self.is_admin || self.is_super }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
  pub user_id: Uuid,
  pub level:   PermissionLevel,
}

// ─── Ledger operations ───────────────────────────────────────────────────────

impl Session<'_> {
  /// True if the viewer holds `level` (or higher) on `document`, or is a
  /// global admin/super-user.
  pub fn has_permission(
    &mut self,
    document: Uuid,
    level: PermissionLevel,
  ) -> Result<bool> {
    if self.viewer().is_global() {
      return Ok(true);
    }
    let Some(user) = self.viewer().user_id else {
      return Ok(false);
    };
    if let Some(hit) = self.remembered(document, level, false) {
      return Ok(hit);
    }
    let granted = self
      .txn()
      .permission(document, user)?
      .is_some_and(|held| held >= level);
    self.remember(document, level, false, granted);
    Ok(granted)
  }

  /// `view` permission, or the latest persisted version of `document` is
  /// public.
  pub fn can_view<B: Body>(&mut self, document: Uuid) -> Result<bool> {
    if let Some(hit) = self.remembered(document, PermissionLevel::View, true) {
      return Ok(hit);
    }
    let granted = self.has_permission(document, PermissionLevel::View)?
      || self
        .latest_persisted::<B>(document)?
        .is_some_and(|v| is_public(v.body.public_date(), self.now()));
    self.remember(document, PermissionLevel::View, true, granted);
    Ok(granted)
  }

  /// Grant the creating viewer `admin` on a new document.
  pub fn initialize_permissions(&mut self, document: Uuid) -> Result<()> {
    let user = self
      .viewer()
      .user_id
      .ok_or_else(|| Error::denied("must be logged in to create documents"))?;
    self.txn().set_permission(document, user, PermissionLevel::Admin)?;
    self.forget_access();
    Ok(())
  }

  /// Reconcile the set of users holding exactly `level` on `document`.
  ///
  /// Users in `users` below `level` are raised to it. Users currently at
  /// `level` but missing from `users` are demoted to `view`. The view set
  /// itself can only grow, and the caller may not drop themselves from the
  /// admin set.
  pub fn replace_permissions(
    &mut self,
    document: Uuid,
    level: PermissionLevel,
    users: &[Uuid],
  ) -> Result<()> {
    if !self.has_permission(document, PermissionLevel::Admin)? {
      return Err(Error::denied(format!(
        "admin permission on {document} is required to modify its permissions"
      )));
    }
    if level == PermissionLevel::Admin {
      let caller = self.viewer().user_id;
      if !caller.is_some_and(|me| users.contains(&me)) {
        return Err(Error::input(
          "cannot remove current user from admin permissions",
        ));
      }
    }

    let existing = self.txn().permissions(document)?;
    let demoted: Vec<Uuid> = existing
      .iter()
      .filter(|e| e.level == level && !users.contains(&e.user_id))
      .map(|e| e.user_id)
      .collect();
    if level == PermissionLevel::View && !demoted.is_empty() {
      return Err(Error::input(
        "once a user is granted view permission, it cannot be removed",
      ));
    }
    for user in demoted {
      self.txn().set_permission(document, user, PermissionLevel::View)?;
    }

    for user in users {
      let held = existing
        .iter()
        .find(|e| e.user_id == *user)
        .map(|e| e.level);
      if held.is_none_or(|held| held < level) {
        self.txn().set_permission(document, *user, level)?;
      }
    }
    self.forget_access();
    Ok(())
  }

  /// Remove every ledger entry for `document`.
  pub fn delete_permissions(&mut self, document: Uuid) -> Result<()> {
    let removed = self.txn().delete_permissions(document)?;
    tracing::debug!(%document, removed, "permissions deleted");
    self.forget_access();
    Ok(())
  }

  /// List ledger entries for `document`; requires `admin`.
  pub fn list_permissions(&mut self, document: Uuid) -> Result<Vec<PermissionEntry>> {
    if !self.has_permission(document, PermissionLevel::Admin)? {
      return Err(Error::denied(format!(
        "admin permission on {document} is required to list its permissions"
      )));
    }
    self.txn().permissions(document)
  }

  // ── Listings ──────────────────────────────────────────────────────────

  /// Uuids of `kind` whose latest persisted version is public right now.
  pub fn public_uuids(&self, kind: DocumentKind) -> Result<Vec<Uuid>> {
    self.txn().public_uuids(kind, self.now())
  }

  /// Public uuids of `kind` plus every uuid the viewer holds `view` on,
  /// drafts included. Global viewers see every uuid.
  pub fn viewable_uuids(&self, kind: DocumentKind) -> Result<Vec<Uuid>> {
    if self.viewer().is_global() {
      return self.txn().uuids(kind);
    }
    let mut uuids = self.public_uuids(kind)?;
    if let Some(user) = self.viewer().user_id {
      uuids.extend(self.txn().permitted_uuids(kind, user, PermissionLevel::View)?);
    }
    uuids.sort_unstable();
    uuids.dedup();
    Ok(uuids)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn levels_are_ordered() {
    assert!(PermissionLevel::Admin > PermissionLevel::Edit);
    assert!(PermissionLevel::Edit > PermissionLevel::View);
  }

  #[test]
  fn level_parses_its_own_string() {
    for level in [
      PermissionLevel::View,
      PermissionLevel::Edit,
      PermissionLevel::Admin,
    ] {
      assert_eq!(PermissionLevel::parse(level.as_str()), Some(level));
    }
    assert_eq!(PermissionLevel::parse("owner"), None);
  }

  #[test]
  fn global_flags() {
    assert!(!Viewer::user(Uuid::new_v4()).is_global());
    assert!(Viewer { is_super: true, ..Viewer::anonymous() }.is_global());
  }
}
