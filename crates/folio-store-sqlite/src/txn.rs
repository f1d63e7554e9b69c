//! [`SqliteTxn`]: the [`Txn`] implementation over one open SQLite
//! transaction.

use chrono::{DateTime, Utc};
use folio_core::{
  DocumentKind, PermissionEntry, PermissionLevel, StoredVersion, store::Txn,
};
use rusqlite::{OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RawVersion, VERSION_COLUMNS, decode_dt, decode_level, decode_uuid,
    encode_dt, encode_uuid,
  },
};

/// Borrows the connection of a running transaction. Commit and rollback are
/// decided by [`SqliteStore`](crate::SqliteStore), never here.
pub struct SqliteTxn<'c> {
  conn: &'c rusqlite::Connection,
}

impl<'c> SqliteTxn<'c> {
  pub fn new(conn: &'c rusqlite::Connection) -> Self { Self { conn } }

  fn query_version(
    &self,
    filter: &str,
    params: impl rusqlite::Params,
  ) -> Result<Option<StoredVersion>> {
    let sql = format!("SELECT {VERSION_COLUMNS} FROM versions {filter}");
    self
      .conn
      .query_row(&sql, params, RawVersion::from_row)
      .optional()?
      .map(RawVersion::into_stored)
      .transpose()
  }

  fn query_uuids(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<Uuid>> {
    let mut stmt = self.conn.prepare(sql)?;
    let rows = stmt
      .query_map(params, |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.iter().map(|s| decode_uuid(s)).collect()
  }

  fn put(&self, v: &StoredVersion) -> Result<()> {
    let body_json = serde_json::to_string(&v.body)?;
    self.conn.execute(
      "INSERT INTO versions
         (version_id, kind, uuid, updated_at, persist_date, public_date, body_json)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
       ON CONFLICT(version_id) DO UPDATE SET
         updated_at   = excluded.updated_at,
         persist_date = excluded.persist_date,
         public_date  = excluded.public_date,
         body_json    = excluded.body_json",
      params![
        encode_uuid(v.id),
        v.kind.as_str(),
        encode_uuid(v.uuid),
        encode_dt(v.updated_at),
        v.persist_date.map(encode_dt),
        v.public_date.map(encode_dt),
        body_json,
      ],
    )?;
    Ok(())
  }

  fn level(&self, document: Uuid, user: Uuid) -> Result<Option<PermissionLevel>> {
    let level: Option<String> = self
      .conn
      .query_row(
        "SELECT level FROM permissions WHERE document_uuid = ?1 AND user_id = ?2",
        params![encode_uuid(document), encode_uuid(user)],
        |r| r.get(0),
      )
      .optional()?;
    level.as_deref().map(decode_level).transpose()
  }

  fn entries(&self, document: Uuid) -> Result<Vec<PermissionEntry>> {
    let mut stmt = self.conn.prepare(
      "SELECT user_id, level FROM permissions
       WHERE document_uuid = ?1
       ORDER BY user_id",
    )?;
    let rows = stmt
      .query_map(params![encode_uuid(document)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    rows
      .into_iter()
      .map(|(user, level)| {
        Ok(PermissionEntry {
          user_id: decode_uuid(&user)?,
          level:   decode_level(&level)?,
        })
      })
      .collect()
  }

  fn permitted(
    &self,
    kind: DocumentKind,
    user: Uuid,
    level: PermissionLevel,
  ) -> Result<Vec<Uuid>> {
    let mut stmt = self.conn.prepare(
      "SELECT DISTINCT p.document_uuid, p.level
       FROM permissions p
       JOIN versions v ON v.uuid = p.document_uuid AND v.kind = ?1
       WHERE p.user_id = ?2
       ORDER BY p.document_uuid",
    )?;
    let rows = stmt
      .query_map(params![kind.as_str(), encode_uuid(user)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut uuids = Vec::with_capacity(rows.len());
    for (document, held) in rows {
      if decode_level(&held)? >= level {
        uuids.push(decode_uuid(&document)?);
      }
    }
    Ok(uuids)
  }

  fn published_at(&self, dataset: Uuid, name: &str) -> Result<Option<DateTime<Utc>>> {
    let at: Option<String> = self
      .conn
      .query_row(
        "SELECT published_at FROM publications WHERE dataset_uuid = ?1 AND name = ?2",
        params![encode_uuid(dataset), name],
        |r| r.get(0),
      )
      .optional()?;
    at.as_deref().map(decode_dt).transpose()
  }
}

impl Txn for SqliteTxn<'_> {
  // ── Versions ──────────────────────────────────────────────────────────

  fn draft(&self, kind: DocumentKind, uuid: Uuid) -> folio_core::Result<Option<StoredVersion>> {
    Ok(self.query_version(
      "WHERE kind = ?1 AND uuid = ?2 AND persist_date IS NULL",
      params![kind.as_str(), encode_uuid(uuid)],
    )?)
  }

  fn latest_persisted(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
  ) -> folio_core::Result<Option<StoredVersion>> {
    Ok(self.query_version(
      "WHERE kind = ?1 AND uuid = ?2 AND persist_date IS NOT NULL
       ORDER BY persist_date DESC, seq DESC
       LIMIT 1",
      params![kind.as_str(), encode_uuid(uuid)],
    )?)
  }

  fn persisted_before(
    &self,
    kind: DocumentKind,
    uuid: Uuid,
    at: DateTime<Utc>,
  ) -> folio_core::Result<Option<StoredVersion>> {
    Ok(self.query_version(
      "WHERE kind = ?1 AND uuid = ?2
         AND persist_date IS NOT NULL AND persist_date <= ?3
       ORDER BY persist_date DESC, seq DESC
       LIMIT 1",
      params![kind.as_str(), encode_uuid(uuid), encode_dt(at)],
    )?)
  }

  fn version(&self, kind: DocumentKind, id: Uuid) -> folio_core::Result<Option<StoredVersion>> {
    Ok(self.query_version(
      "WHERE kind = ?1 AND version_id = ?2",
      params![kind.as_str(), encode_uuid(id)],
    )?)
  }

  fn exists(&self, kind: DocumentKind, uuid: Uuid) -> folio_core::Result<bool> {
    let found = self
      .conn
      .query_row(
        "SELECT 1 FROM versions WHERE kind = ?1 AND uuid = ?2 LIMIT 1",
        params![kind.as_str(), encode_uuid(uuid)],
        |_| Ok(true),
      )
      .optional()
      .map_err(crate::Error::from)?;
    Ok(found.unwrap_or(false))
  }

  fn put_version(&self, version: &StoredVersion) -> folio_core::Result<()> {
    Ok(self.put(version)?)
  }

  fn delete_draft(&self, kind: DocumentKind, uuid: Uuid) -> folio_core::Result<bool> {
    let removed = self
      .conn
      .execute(
        "DELETE FROM versions
         WHERE kind = ?1 AND uuid = ?2 AND persist_date IS NULL",
        params![kind.as_str(), encode_uuid(uuid)],
      )
      .map_err(crate::Error::from)?;
    Ok(removed > 0)
  }

  // ── Listings ──────────────────────────────────────────────────────────

  fn uuids(&self, kind: DocumentKind) -> folio_core::Result<Vec<Uuid>> {
    Ok(self.query_uuids(
      "SELECT DISTINCT uuid FROM versions WHERE kind = ?1 ORDER BY uuid",
      params![kind.as_str()],
    )?)
  }

  fn public_uuids(
    &self,
    kind: DocumentKind,
    at: DateTime<Utc>,
  ) -> folio_core::Result<Vec<Uuid>> {
    // Only the latest persisted version of each uuid decides.
    Ok(self.query_uuids(
      "SELECT v.uuid FROM versions v
       WHERE v.kind = ?1
         AND v.public_date IS NOT NULL AND v.public_date <= ?2
         AND v.seq = (
           SELECT w.seq FROM versions w
           WHERE w.kind = v.kind AND w.uuid = v.uuid
             AND w.persist_date IS NOT NULL
           ORDER BY w.persist_date DESC, w.seq DESC
           LIMIT 1
         )
       ORDER BY v.uuid",
      params![kind.as_str(), encode_dt(at)],
    )?)
  }

  fn permitted_uuids(
    &self,
    kind: DocumentKind,
    user: Uuid,
    level: PermissionLevel,
  ) -> folio_core::Result<Vec<Uuid>> {
    Ok(self.permitted(kind, user, level)?)
  }

  fn records_in_dataset(&self, dataset: Uuid) -> folio_core::Result<Vec<Uuid>> {
    Ok(self.query_uuids(
      "SELECT DISTINCT uuid FROM versions
       WHERE kind = 'record'
         AND json_extract(body_json, '$.dataset_uuid') = ?1
       ORDER BY uuid",
      params![encode_uuid(dataset)],
    )?)
  }

  // ── Permission ledger ─────────────────────────────────────────────────

  fn permission(
    &self,
    document: Uuid,
    user: Uuid,
  ) -> folio_core::Result<Option<PermissionLevel>> {
    Ok(self.level(document, user)?)
  }

  fn permissions(&self, document: Uuid) -> folio_core::Result<Vec<PermissionEntry>> {
    Ok(self.entries(document)?)
  }

  fn set_permission(
    &self,
    document: Uuid,
    user: Uuid,
    level: PermissionLevel,
  ) -> folio_core::Result<()> {
    self
      .conn
      .execute(
        "INSERT INTO permissions (document_uuid, user_id, level)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(document_uuid, user_id) DO UPDATE SET level = excluded.level",
        params![encode_uuid(document), encode_uuid(user), level.as_str()],
      )
      .map_err(crate::Error::from)?;
    Ok(())
  }

  fn delete_permissions(&self, document: Uuid) -> folio_core::Result<usize> {
    let removed = self
      .conn
      .execute(
        "DELETE FROM permissions WHERE document_uuid = ?1",
        params![encode_uuid(document)],
      )
      .map_err(crate::Error::from)?;
    Ok(removed)
  }

  // ── Publications ──────────────────────────────────────────────────────

  fn publication(
    &self,
    dataset: Uuid,
    name: &str,
  ) -> folio_core::Result<Option<DateTime<Utc>>> {
    Ok(self.published_at(dataset, name)?)
  }

  fn put_publication(
    &self,
    dataset: Uuid,
    name: &str,
    at: DateTime<Utc>,
  ) -> folio_core::Result<()> {
    self
      .conn
      .execute(
        "INSERT INTO publications (dataset_uuid, name, published_at)
         VALUES (?1, ?2, ?3)",
        params![encode_uuid(dataset), name, encode_dt(at)],
      )
      .map_err(crate::Error::from)?;
    Ok(())
  }
}
