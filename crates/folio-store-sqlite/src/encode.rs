//! Encoding and decoding helpers between core types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with exactly three fractional digits and a
//! `Z` suffix, so lexical order matches chronological order. Bodies are
//! compact JSON. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use folio_core::{DocumentKind, PermissionLevel, StoredVersion};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<DocumentKind> {
  DocumentKind::parse(s).ok_or_else(|| Error::Decode(format!("unknown document kind: {s:?}")))
}

pub fn decode_level(s: &str) -> Result<PermissionLevel> {
  PermissionLevel::parse(s)
    .ok_or_else(|| Error::Decode(format!("unknown permission level: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `versions` row. Queries select
/// [`VERSION_COLUMNS`] in that order.
pub const VERSION_COLUMNS: &str =
  "version_id, kind, uuid, updated_at, persist_date, public_date, body_json";

pub struct RawVersion {
  pub version_id:   String,
  pub kind:         String,
  pub uuid:         String,
  pub updated_at:   String,
  pub persist_date: Option<String>,
  pub public_date:  Option<String>,
  pub body_json:    String,
}

impl RawVersion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:   row.get(0)?,
      kind:         row.get(1)?,
      uuid:         row.get(2)?,
      updated_at:   row.get(3)?,
      persist_date: row.get(4)?,
      public_date:  row.get(5)?,
      body_json:    row.get(6)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredVersion> {
    Ok(StoredVersion {
      kind:         decode_kind(&self.kind)?,
      id:           decode_uuid(&self.version_id)?,
      uuid:         decode_uuid(&self.uuid)?,
      updated_at:   decode_dt(&self.updated_at)?,
      persist_date: self.persist_date.as_deref().map(decode_dt).transpose()?,
      public_date:  self.public_date.as_deref().map(decode_dt).transpose()?,
      body:         serde_json::from_str(&self.body_json)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  #[test]
  fn timestamps_keep_millis_and_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
      + Duration::milliseconds(7);
    let b = a + Duration::milliseconds(993);
    assert_eq!(encode_dt(a), "2024-03-01T12:00:00.007Z");
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
    assert!(encode_dt(a) < encode_dt(b));
  }

  #[test]
  fn unknown_kind_is_a_decode_error() {
    assert!(matches!(decode_kind("contact"), Err(Error::Decode(_))));
    assert_eq!(decode_kind("template_field").unwrap(), DocumentKind::TemplateField);
  }
}
