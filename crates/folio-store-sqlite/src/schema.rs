//! SQL schema for the Folio SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Every version of every document. Persisted rows never change again;
-- the single draft row per (kind, uuid) is rewritten in place.
CREATE TABLE IF NOT EXISTS versions (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id   TEXT NOT NULL UNIQUE,
    kind         TEXT NOT NULL,   -- 'template' | 'template_field' | 'dataset' | 'record'
    uuid         TEXT NOT NULL,
    updated_at   TEXT NOT NULL,   -- RFC 3339 UTC, millisecond precision
    persist_date TEXT,            -- NULL while a draft
    public_date  TEXT,            -- copied out of body_json
    body_json    TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS versions_one_draft_idx
    ON versions(kind, uuid) WHERE persist_date IS NULL;
CREATE INDEX IF NOT EXISTS versions_persisted_idx
    ON versions(kind, uuid, persist_date);

CREATE TABLE IF NOT EXISTS permissions (
    document_uuid TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    level         TEXT NOT NULL,  -- 'view' | 'edit' | 'admin'
    PRIMARY KEY (document_uuid, user_id)
);

-- Named points in time at which a dataset was published.
CREATE TABLE IF NOT EXISTS publications (
    dataset_uuid TEXT NOT NULL,
    name         TEXT NOT NULL,
    published_at TEXT NOT NULL,
    PRIMARY KEY (dataset_uuid, name)
);

PRAGMA user_version = 1;
";
