//! Import orchestration
//!
//! Runs the organization file to completion, then the posting file, and
//! reports how many of each were inserted. Both files must exist before any
//! row is read.

use chrono::Utc;
use jt_common::config::ImportSettings;
use jt_common::events::{EventBus, JtEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::key_locks::KeyLocks;
use super::organization_reconciler::OrganizationReconciler;
use super::posting_reconciler::PostingReconciler;
use super::row_decoder::RowSource;
use super::StageReport;
use crate::db::{PersistenceGateway, SqliteGateway};
use crate::error::{ImportError, Stage};

/// Result returned to whoever triggered the import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub organizations_imported: usize,
    pub jobs_imported: usize,
    #[serde(skip)]
    pub organizations: StageReport,
    #[serde(skip)]
    pub postings: StageReport,
}

/// Drives both import stages against one store
///
/// Cheap to clone; clones share the per-key lock tables so concurrent
/// triggers in one process never race on the same external id.
#[derive(Clone)]
pub struct ImportOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    settings: ImportSettings,
    organization_locks: Arc<KeyLocks<i64>>,
    posting_locks: Arc<KeyLocks<String>>,
}

impl ImportOrchestrator {
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: ImportSettings) -> Self {
        Self {
            db,
            event_bus,
            settings,
            organization_locks: Arc::new(KeyLocks::new()),
            posting_locks: Arc::new(KeyLocks::new()),
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Import both files with a fresh SQLite gateway
    pub async fn run(
        &self,
        organizations_path: &Path,
        postings_path: &Path,
    ) -> Result<ImportSummary, ImportError> {
        let gateway = SqliteGateway::new(self.db.clone(), self.settings.commit_batch_size);
        self.run_with_gateway(&gateway, organizations_path, postings_path)
            .await
    }

    /// Import both files through the given gateway
    pub async fn run_with_gateway(
        &self,
        gateway: &dyn PersistenceGateway,
        organizations_path: &Path,
        postings_path: &Path,
    ) -> Result<ImportSummary, ImportError> {
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            organizations = %organizations_path.display(),
            postings = %postings_path.display(),
            "Import run started"
        );
        self.event_bus.emit_lossy(JtEvent::ImportStarted {
            run_id,
            timestamp: Utc::now(),
        });

        let result = self
            .run_stages(run_id, gateway, organizations_path, postings_path)
            .await;

        match &result {
            Ok(summary) => {
                info!(
                    run_id = %run_id,
                    organizations_imported = summary.organizations_imported,
                    jobs_imported = summary.jobs_imported,
                    placeholders_created = summary.postings.placeholders_created,
                    "Import run completed"
                );
                self.event_bus.emit_lossy(JtEvent::ImportCompleted {
                    run_id,
                    organizations_imported: summary.organizations_imported,
                    jobs_imported: summary.jobs_imported,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                if let ImportError::Store(store_err) = e {
                    if store_err.is_database_locked() {
                        warn!(
                            run_id = %run_id,
                            "Store stayed locked past the busy timeout, another writer holds it"
                        );
                    }
                }
                error!(run_id = %run_id, error = %e, "Import run failed");
                self.event_bus.emit_lossy(JtEvent::ImportFailed {
                    run_id,
                    not_found: e.is_not_found(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        gateway: &dyn PersistenceGateway,
        organizations_path: &Path,
        postings_path: &Path,
    ) -> Result<ImportSummary, ImportError> {
        // Both files are required up front; neither stage runs if one is missing
        let organization_source = RowSource::open(Stage::Organizations, organizations_path)?;
        let posting_source = RowSource::open(Stage::Postings, postings_path)?;

        let concurrency = self.settings.max_concurrent_rows;

        let organizations = OrganizationReconciler::new(gateway, &self.organization_locks)
            .with_concurrency(concurrency)
            .import_organizations(organization_source)
            .await?;
        self.event_bus.emit_lossy(JtEvent::OrganizationsImported {
            run_id,
            count: organizations.inserted,
            timestamp: Utc::now(),
        });

        let postings =
            PostingReconciler::new(gateway, &self.posting_locks, &self.organization_locks)
                .with_concurrency(concurrency)
                .import_postings(posting_source)
                .await?;
        if postings.inserted > 0 {
            self.event_bus.emit_lossy(JtEvent::PostingsChanged {
                run_id,
                count: postings.inserted,
                timestamp: Utc::now(),
            });
        }

        Ok(ImportSummary {
            organizations_imported: organizations.inserted,
            jobs_imported: postings.inserted,
            organizations,
            postings,
        })
    }
}
