//! [`SqliteStore`]: the SQLite implementation of [`Store`].

use std::{future::Future, path::Path};

use folio_core::store::{Store, Txn};

use crate::{Error, Result, schema::SCHEMA, txn::SqliteTxn};

/// A Folio document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl Store for SqliteStore {
  fn transact<F, R>(
    &self,
    f: F,
  ) -> impl Future<Output = folio_core::Result<R>> + Send + '_
  where
    F: FnOnce(&dyn Txn) -> folio_core::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    async move {
      let outcome = self
        .conn
        .call(move |conn| {
          let tx = conn.transaction()?;
          let outcome = f(&SqliteTxn::new(&tx));
          match &outcome {
            Ok(_) => tx.commit()?,
            Err(err) => {
              tracing::debug!(error = %err, "rolling back transaction");
              tx.rollback()?;
            }
          }
          Ok(outcome)
        })
        .await
        .map_err(Error::from)?;
      outcome
    }
  }
}
