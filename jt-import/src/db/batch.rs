//! Batch transaction with hold-time logging
//!
//! Import writes accumulate in one transaction that is committed every
//! `commit_batch_size` writes (or when a reconciler asks). Commit and drop both
//! log how long the connection was held. There is no explicit rollback: a
//! batch dropped while still open is rolled back by sqlx.

use jt_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

/// Hold time above which a batch is reported at WARN
const LONG_HOLD_MS: u128 = 2000;

/// Open write batch over one pooled connection
pub struct BatchTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    caller: &'static str,
    opened_at: Instant,
    pending_writes: usize,
}

impl BatchTransaction {
    /// Begin a batch, logging how long the connection took to acquire
    pub async fn begin(pool: &SqlitePool, caller: &'static str) -> Result<Self> {
        let start = Instant::now();
        let tx = pool.begin().await?;

        let wait_ms = start.elapsed().as_millis();
        if wait_ms > 1000 {
            tracing::warn!(caller, wait_ms, "Slow connection acquisition for import batch");
        } else {
            tracing::debug!(caller, wait_ms, "Import batch opened");
        }

        Ok(Self {
            tx: Some(tx),
            caller,
            opened_at: Instant::now(),
            pending_writes: 0,
        })
    }

    /// Connection the batch runs on
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal("Import batch already closed".to_string())),
        }
    }

    /// Count one successful write
    pub fn record_write(&mut self) {
        self.pending_writes += 1;
    }

    /// Writes not yet committed
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    /// Commit, returning how many writes became visible
    pub async fn commit(mut self) -> Result<usize> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Import batch already closed".to_string()))?;

        tx.commit().await?;

        let held_ms = self.opened_at.elapsed().as_millis();
        if held_ms > LONG_HOLD_MS {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                writes = self.pending_writes,
                "LONG TRANSACTION - import batch held the write lock for an extended period"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms,
                writes = self.pending_writes,
                "Import batch committed"
            );
        }

        Ok(self.pending_writes)
    }
}

impl Drop for BatchTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let held_ms = self.opened_at.elapsed().as_millis();
            if self.pending_writes > 0 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms,
                    discarded = self.pending_writes,
                    "Import batch dropped while open, pending writes rolled back"
                );
            } else {
                tracing::debug!(caller = self.caller, held_ms, "Import batch released (drop)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::organizations;
    use jt_common::db::{init_memory_database, NewOrganization};

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let pool = init_memory_database().await.unwrap();

        let mut batch = BatchTransaction::begin(&pool, "test").await.unwrap();
        organizations::insert(batch.connection().unwrap(), &NewOrganization::placeholder(1))
            .await
            .unwrap();
        batch.record_write();

        assert_eq!(batch.commit().await.unwrap(), 1);
        assert_eq!(organizations::count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let pool = init_memory_database().await.unwrap();

        {
            let mut batch = BatchTransaction::begin(&pool, "test").await.unwrap();
            organizations::insert(batch.connection().unwrap(), &NewOrganization::placeholder(1))
                .await
                .unwrap();
            batch.record_write();
        }

        assert_eq!(organizations::count(&pool).await.unwrap(), 0);
    }
}
