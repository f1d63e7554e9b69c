//! The versioned document model shared by every document kind.
//!
//! A document is a chain of [`Version`]s sharing one `uuid`. At most one
//! version per uuid is a draft (no `persist_date`); all others are persisted
//! and never change again.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
  Template,
  TemplateField,
  Dataset,
  Record,
}

impl DocumentKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Template => "template",
      Self::TemplateField => "template_field",
      Self::Dataset => "dataset",
      Self::Record => "record",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "template" => Some(Self::Template),
      "template_field" => Some(Self::TemplateField),
      "dataset" => Some(Self::Dataset),
      "record" => Some(Self::Record),
      _ => None,
    }
  }
}

impl fmt::Display for DocumentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Versions ────────────────────────────────────────────────────────────────

/// A version as the store sees it: bookkeeping columns plus an opaque JSON
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
  pub kind:         DocumentKind,
  pub id:           Uuid,
  pub uuid:         Uuid,
  pub updated_at:   DateTime<Utc>,
  pub persist_date: Option<DateTime<Utc>>,
  /// Copied out of the body so backends can list public documents.
  pub public_date:  Option<DateTime<Utc>>,
  pub body:         serde_json::Value,
}

/// Kind-specific payload of a version.
pub trait Body: Serialize + DeserializeOwned + Clone + Send + 'static {
  const KIND: DocumentKind;

  /// Date from which the document is readable without explicit permission.
  fn public_date(&self) -> Option<DateTime<Utc>> { None }
}

/// A decoded version of a document of kind `B::KIND`.
#[derive(Debug, Clone, PartialEq)]
pub struct Version<B> {
  /// Identifies this one version. Stable while a draft is edited; persisting
  /// freezes it.
  pub id:           Uuid,
  pub uuid:         Uuid,
  pub updated_at:   DateTime<Utc>,
  pub persist_date: Option<DateTime<Utc>>,
  pub body:         B,
}

impl<B: Body> Version<B> {
  pub fn is_draft(&self) -> bool { self.persist_date.is_none() }

  pub fn decode(stored: StoredVersion) -> Result<Self> {
    if stored.kind != B::KIND {
      return Err(Error::Internal(format!(
        "expected a {} version, found {} {}",
        B::KIND,
        stored.kind,
        stored.id
      )));
    }
    Ok(Self {
      id:           stored.id,
      uuid:         stored.uuid,
      updated_at:   stored.updated_at,
      persist_date: stored.persist_date,
      body:         serde_json::from_value(stored.body)?,
    })
  }

  pub fn encode(&self) -> Result<StoredVersion> {
    Ok(StoredVersion {
      kind:         B::KIND,
      id:           self.id,
      uuid:         self.uuid,
      updated_at:   self.updated_at,
      persist_date: self.persist_date,
      public_date:  self.body.public_date(),
      body:         serde_json::to_value(&self.body)?,
    })
  }
}

// ─── Time ────────────────────────────────────────────────────────────────────

/// Drop sub-millisecond precision; every timestamp the engine writes goes
/// through this so that concurrency tokens compare exactly.
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

pub fn same_millis(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
  a.timestamp_millis() == b.timestamp_millis()
}

/// A document is public once its `public_date` has passed.
pub fn is_public(public_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
  public_date.is_some_and(|d| d <= now)
}

/// `true` when `a` and `b` contain the same elements in any order.
pub(crate) fn same_set(a: &[Uuid], b: &[Uuid]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut a = a.to_vec();
  let mut b = b.to_vec();
  a.sort_unstable();
  b.sort_unstable();
  a == b
}

pub(crate) fn has_duplicates(ids: &[Uuid]) -> bool {
  let mut seen = std::collections::HashSet::with_capacity(ids.len());
  ids.iter().any(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn truncation_drops_sub_millisecond_part() {
    let dt = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let t = truncate_millis(dt);
    assert_eq!(t.timestamp_subsec_nanos(), 123_000_000);
    assert!(same_millis(dt, t));
  }

  #[test]
  fn public_only_once_date_has_passed() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    assert!(!is_public(None, now));
    assert!(is_public(Some(now), now));
    assert!(!is_public(Some(now + chrono::Duration::seconds(1)), now));
  }

  #[test]
  fn set_helpers() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert!(same_set(&[a, b], &[b, a]));
    assert!(!same_set(&[a], &[b]));
    assert!(has_duplicates(&[a, b, a]));
    assert!(!has_duplicates(&[a, b]));
  }

  #[test]
  fn kind_round_trips_through_str() {
    for kind in [
      DocumentKind::Template,
      DocumentKind::TemplateField,
      DocumentKind::Dataset,
      DocumentKind::Record,
    ] {
      assert_eq!(DocumentKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(DocumentKind::parse("contact"), None);
  }
}
