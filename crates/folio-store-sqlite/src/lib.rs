//! SQLite backend for the Folio document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every [`Store::transact`] call is one
//! SQLite transaction.
//!
//! [`Store::transact`]: folio_core::store::Store::transact

mod encode;
mod schema;
mod store;
mod txn;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
