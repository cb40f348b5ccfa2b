//! SQLite-backed persistence gateway

use async_trait::async_trait;
use jt_common::db::{NewOrganization, NewPosting, Organization, Posting};
use jt_common::{Error, Result};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::batch::BatchTransaction;
use super::{organizations, postings, PersistenceGateway};

const BATCH_CALLER: &str = "import_batch";

/// Gateway over a SQLite pool
///
/// The batch opens on the first insert. While it is open, lookups run on the
/// batch connection so they see uncommitted rows. Dropping the gateway with
/// an open batch rolls it back.
pub struct SqliteGateway {
    pool: SqlitePool,
    batch: Mutex<Option<BatchTransaction>>,
    commit_batch_size: usize,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool, commit_batch_size: usize) -> Self {
        Self {
            pool,
            batch: Mutex::new(None),
            commit_batch_size: commit_batch_size.max(1),
        }
    }

    /// Writes waiting in the open batch
    pub async fn pending_writes(&self) -> usize {
        self.batch
            .lock()
            .await
            .as_ref()
            .map(BatchTransaction::pending_writes)
            .unwrap_or(0)
    }

    async fn open_batch<'a>(
        &self,
        slot: &'a mut Option<BatchTransaction>,
    ) -> Result<&'a mut BatchTransaction> {
        if slot.is_none() {
            *slot = Some(BatchTransaction::begin(&self.pool, BATCH_CALLER).await?);
        }
        slot.as_mut()
            .ok_or_else(|| Error::Internal("Import batch failed to open".to_string()))
    }

    async fn commit_if_full(&self, slot: &mut Option<BatchTransaction>) -> Result<()> {
        let full = slot
            .as_ref()
            .is_some_and(|batch| batch.pending_writes() >= self.commit_batch_size);

        if full {
            if let Some(batch) = slot.take() {
                batch.commit().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn find_organization_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Organization>> {
        let mut slot = self.batch.lock().await;
        match slot.as_mut() {
            Some(batch) => organizations::find_by_external_id(batch.connection()?, external_id).await,
            None => {
                let mut conn = self.pool.acquire().await?;
                organizations::find_by_external_id(&mut *conn, external_id).await
            }
        }
    }

    async fn insert_organization(&self, org: &NewOrganization) -> Result<Option<Organization>> {
        let mut slot = self.batch.lock().await;

        let batch = self.open_batch(&mut *slot).await?;
        let inserted = organizations::insert(batch.connection()?, org).await?;
        if inserted.is_some() {
            batch.record_write();
        }

        self.commit_if_full(&mut *slot).await?;
        Ok(inserted)
    }

    async fn find_posting_by_external_id(&self, external_id: &str) -> Result<Option<Posting>> {
        let mut slot = self.batch.lock().await;
        match slot.as_mut() {
            Some(batch) => postings::find_by_external_id(batch.connection()?, external_id).await,
            None => {
                let mut conn = self.pool.acquire().await?;
                postings::find_by_external_id(&mut *conn, external_id).await
            }
        }
    }

    async fn insert_posting(&self, posting: &NewPosting) -> Result<Option<Posting>> {
        let mut slot = self.batch.lock().await;

        let batch = self.open_batch(&mut *slot).await?;
        let inserted = postings::insert(batch.connection()?, posting).await?;
        if inserted.is_some() {
            batch.record_write();
        }

        self.commit_if_full(&mut *slot).await?;
        Ok(inserted)
    }

    async fn commit(&self) -> Result<()> {
        let batch = self.batch.lock().await.take();
        if let Some(batch) = batch {
            batch.commit().await?;
        }
        Ok(())
    }
}
