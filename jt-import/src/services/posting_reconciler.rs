//! Posting reconciliation
//!
//! A posting names its organization by external id. When that organization
//! is not stored yet, a placeholder is created and committed before the
//! posting is written, so the posting file can be imported ahead of (or
//! without) the organization file and no stored posting ever points at a
//! missing organization.

use chrono::{DateTime, Utc};
use jt_common::db::{NewOrganization, NewPosting, Organization};
use rust_decimal::Decimal;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, trace};

use super::key_locks::KeyLocks;
use super::row_decoder::{DecodedRow, Field, RowSource};
use super::{drive_rows, RowOutcome, SkipReason, StageReport};
use crate::db::PersistenceGateway;
use crate::error::ImportError;

/// Posting file columns
pub mod columns {
    pub const EXTERNAL_ID: &str = "job_id";
    pub const ORGANIZATION_REF: &str = "company_id";
    pub const TITLE: &str = "title";
    pub const SALARY_MAX: &str = "max_salary";
    pub const SALARY_MIN: &str = "min_salary";
    pub const EMPLOYMENT_TYPE: &str = "formatted_work_type";
    pub const LOCATION: &str = "location";
    pub const SENIORITY_LEVEL: &str = "formatted_experience_level";
}

/// Posting fields taken from one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingCandidate {
    pub external_id: String,
    pub organization_ref: i64,
    pub title: String,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub seniority_level: Option<String>,
    pub salary_min: Option<Decimal>,
    pub salary_max: Option<Decimal>,
}

impl PostingCandidate {
    /// Checks run in order: organization reference, title, posting id
    pub fn from_row(row: &DecodedRow) -> Result<Self, SkipReason> {
        let organization_ref = match row.long(columns::ORGANIZATION_REF) {
            Field::Value(id) => id,
            Field::Absent => return Err(SkipReason::MissingOrganizationRef),
            Field::Unparsable(raw) => return Err(SkipReason::UnparsableOrganizationRef(raw)),
        };

        let title = row
            .text_owned(columns::TITLE)
            .ok_or(SkipReason::MissingTitle)?;

        let external_id = row
            .text_owned(columns::EXTERNAL_ID)
            .ok_or(SkipReason::MissingExternalId)?;

        // Salaries are independent; an unparsable one is simply left out
        let salary_min = row.decimal(columns::SALARY_MIN).value();
        let salary_max = row.decimal(columns::SALARY_MAX).value();

        Ok(Self {
            external_id,
            organization_ref,
            title,
            location: row.text_owned(columns::LOCATION),
            employment_type: row.text_owned(columns::EMPLOYMENT_TYPE),
            seniority_level: row.text_owned(columns::SENIORITY_LEVEL),
            salary_min,
            salary_max,
        })
    }

    pub fn into_new(self, organization_id: i64, posted_at: DateTime<Utc>) -> NewPosting {
        NewPosting {
            external_id: self.external_id,
            title: self.title,
            location: self.location,
            employment_type: self.employment_type,
            seniority_level: self.seniority_level,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            posted_at,
            organization_id,
        }
    }
}

/// Imports the posting file
///
/// Lock order is always posting key, then organization key.
pub struct PostingReconciler<'a> {
    gateway: &'a dyn PersistenceGateway,
    posting_locks: &'a KeyLocks<String>,
    organization_locks: &'a KeyLocks<i64>,
    max_concurrent_rows: usize,
}

impl<'a> PostingReconciler<'a> {
    pub fn new(
        gateway: &'a dyn PersistenceGateway,
        posting_locks: &'a KeyLocks<String>,
        organization_locks: &'a KeyLocks<i64>,
    ) -> Self {
        Self {
            gateway,
            posting_locks,
            organization_locks,
            max_concurrent_rows: 1,
        }
    }

    /// Reconcile up to `rows` rows at once
    pub fn with_concurrency(mut self, rows: usize) -> Self {
        self.max_concurrent_rows = rows.max(1);
        self
    }

    /// Import every row, then commit
    pub async fn import_postings<R: Read>(
        &self,
        source: RowSource<R>,
    ) -> Result<StageReport, ImportError> {
        let path = source.path().to_path_buf();
        let placeholders = AtomicUsize::new(0);

        let mut report = drive_rows(source, self.max_concurrent_rows, |row| {
            self.reconcile_row(row, &placeholders)
        })
        .await?;
        self.gateway.commit().await?;

        report.placeholders_created = placeholders.load(Ordering::Relaxed);

        info!(
            path = %path.display(),
            rows_read = report.rows_read,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            skipped_invalid = report.skipped_invalid,
            placeholders_created = report.placeholders_created,
            "Posting import complete"
        );

        Ok(report)
    }

    async fn reconcile_row(
        &self,
        row: DecodedRow,
        placeholders: &AtomicUsize,
    ) -> Result<RowOutcome, ImportError> {
        let candidate = match PostingCandidate::from_row(&row) {
            Ok(candidate) => candidate,
            Err(reason) => return Ok(RowOutcome::SkippedInvalid(reason)),
        };

        let _guard = self.posting_locks.lock(candidate.external_id.clone()).await;

        if self
            .gateway
            .find_posting_by_external_id(&candidate.external_id)
            .await?
            .is_some()
        {
            trace!(external_id = %candidate.external_id, "Posting already stored");
            return Ok(RowOutcome::SkippedExisting);
        }

        // Must be committed before the posting insert below is issued
        let organization = self
            .resolve_organization(candidate.organization_ref, placeholders)
            .await?;

        let posting = candidate.into_new(organization.id, Utc::now());
        match self.gateway.insert_posting(&posting).await? {
            Some(stored) => {
                trace!(
                    external_id = %stored.external_id,
                    organization_id = stored.organization_id,
                    "Posting inserted"
                );
                Ok(RowOutcome::Inserted)
            }
            None => Ok(RowOutcome::SkippedExisting),
        }
    }

    /// Find the owning organization, creating and committing a placeholder if needed
    async fn resolve_organization(
        &self,
        external_id: i64,
        placeholders: &AtomicUsize,
    ) -> Result<Organization, ImportError> {
        let _guard = self.organization_locks.lock(external_id).await;

        if let Some(org) = self
            .gateway
            .find_organization_by_external_id(external_id)
            .await?
        {
            return Ok(org);
        }

        match self
            .gateway
            .insert_organization(&NewOrganization::placeholder(external_id))
            .await?
        {
            Some(org) => {
                self.gateway.commit().await?;
                placeholders.fetch_add(1, Ordering::Relaxed);
                info!(external_id, id = org.id, "Created placeholder organization");
                Ok(org)
            }
            // Another writer stored it between our lookup and insert
            None => self
                .gateway
                .find_organization_by_external_id(external_id)
                .await?
                .ok_or_else(|| {
                    ImportError::Store(jt_common::Error::Internal(format!(
                        "Organization {} rejected as duplicate but not found",
                        external_id
                    )))
                }),
        }
    }
}
