//! Core types and engine for the Folio document repository.
//!
//! Templates, template fields, datasets and records are versioned documents
//! with a draft/persist lifecycle, linked into trees whose reads are filtered
//! by a per-document permission ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::Store`]; callers go through
//! [`repository::Repository`].

pub mod dataset;
pub mod document;
pub mod error;
pub mod field;
pub mod lifecycle;
pub mod options;
pub mod permission;
pub mod projection;
pub mod record;
pub mod repository;
pub mod session;
pub mod store;
pub mod template;

pub use dataset::{Dataset, DatasetInput, DatasetView};
pub use document::{DocumentKind, StoredVersion, Version};
pub use error::{Error, Result};
pub use field::{FieldInput, FieldType, FieldView, TemplateField};
pub use lifecycle::Document;
pub use permission::{PermissionEntry, PermissionLevel, Viewer};
pub use projection::Linked;
pub use record::{Record, RecordInput, RecordView};
pub use repository::Repository;
pub use template::{SubscribedTemplate, Template, TemplateInput, TemplateView};
