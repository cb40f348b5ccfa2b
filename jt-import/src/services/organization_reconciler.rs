//! Organization reconciliation
//!
//! Each row is parsed into a candidate, then inserted unless an organization
//! with the same external id is already stored. Existing rows are never
//! updated; the first write wins.

use jt_common::db::NewOrganization;
use std::io::Read;
use tracing::{info, trace};

use super::key_locks::KeyLocks;
use super::row_decoder::{DecodedRow, Field, RowSource};
use super::{drive_rows, RowOutcome, SkipReason, StageReport};
use crate::db::PersistenceGateway;
use crate::error::ImportError;

/// Organization file columns
pub mod columns {
    pub const EXTERNAL_ID: &str = "company_id";
    pub const NAME: &str = "name";
    pub const CITY: &str = "city";
    pub const REGION: &str = "state";
    pub const COUNTRY: &str = "country";
}

/// Organization fields taken from one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationCandidate {
    pub external_id: i64,
    pub name: String,
    pub location: String,
}

impl OrganizationCandidate {
    pub fn from_row(row: &DecodedRow) -> Result<Self, SkipReason> {
        let external_id = match row.long(columns::EXTERNAL_ID) {
            Field::Value(id) => id,
            Field::Absent => return Err(SkipReason::MissingExternalId),
            Field::Unparsable(raw) => return Err(SkipReason::UnparsableExternalId(raw)),
        };

        let location = join_location(&[
            row.text(columns::CITY),
            row.text(columns::REGION),
            row.text(columns::COUNTRY),
        ]);

        Ok(Self {
            external_id,
            name: row.text_owned(columns::NAME).unwrap_or_default(),
            location,
        })
    }

    pub fn into_new(self) -> NewOrganization {
        NewOrganization {
            external_id: self.external_id,
            name: self.name,
            location: Some(self.location),
            industry: None,
        }
    }
}

/// Join the present parts with ", ", keeping their order
pub fn join_location(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Imports the organization file
pub struct OrganizationReconciler<'a> {
    gateway: &'a dyn PersistenceGateway,
    locks: &'a KeyLocks<i64>,
    max_concurrent_rows: usize,
}

impl<'a> OrganizationReconciler<'a> {
    pub fn new(gateway: &'a dyn PersistenceGateway, locks: &'a KeyLocks<i64>) -> Self {
        Self {
            gateway,
            locks,
            max_concurrent_rows: 1,
        }
    }

    /// Reconcile up to `rows` rows at once
    pub fn with_concurrency(mut self, rows: usize) -> Self {
        self.max_concurrent_rows = rows.max(1);
        self
    }

    /// Import every row, then commit
    ///
    /// `StageReport::inserted` counts rows actually written, not rows read.
    pub async fn import_organizations<R: Read>(
        &self,
        source: RowSource<R>,
    ) -> Result<StageReport, ImportError> {
        let path = source.path().to_path_buf();

        let report = drive_rows(source, self.max_concurrent_rows, |row| self.reconcile_row(row))
            .await?;
        self.gateway.commit().await?;

        info!(
            path = %path.display(),
            rows_read = report.rows_read,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            skipped_invalid = report.skipped_invalid,
            "Organization import complete"
        );

        Ok(report)
    }

    async fn reconcile_row(&self, row: DecodedRow) -> Result<RowOutcome, ImportError> {
        let candidate = match OrganizationCandidate::from_row(&row) {
            Ok(candidate) => candidate,
            Err(reason) => return Ok(RowOutcome::SkippedInvalid(reason)),
        };
        let external_id = candidate.external_id;

        let _guard = self.locks.lock(external_id).await;

        if self
            .gateway
            .find_organization_by_external_id(external_id)
            .await?
            .is_some()
        {
            trace!(external_id, "Organization already stored");
            return Ok(RowOutcome::SkippedExisting);
        }

        match self.gateway.insert_organization(&candidate.into_new()).await? {
            Some(org) => {
                trace!(external_id, id = org.id, "Organization inserted");
                Ok(RowOutcome::Inserted)
            }
            None => Ok(RowOutcome::SkippedExisting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_organizations, SqliteGateway};
    use crate::services::row_decoder::SourceItem;
    use jt_common::db::init_memory_database;
    use std::path::Path;

    fn source(data: &str) -> RowSource<&[u8]> {
        RowSource::from_reader(data.as_bytes(), Path::new("companies.csv")).unwrap()
    }

    fn first_row(data: &str) -> DecodedRow {
        let source = source(data);
        let item = source.items().next().unwrap().unwrap();
        match item {
            SourceItem::Row(row) => row,
            other => panic!("expected row, got {:?}", other),
        }
    }

    #[test]
    fn test_location_skips_empty_parts() {
        assert_eq!(join_location(&[Some("Austin"), Some("TX"), Some("")]), "Austin, TX");
        assert_eq!(join_location(&[None, Some("TX"), Some("US")]), "TX, US");
        assert_eq!(join_location(&[Some(" "), None, None]), "");
    }

    #[test]
    fn test_candidate_from_row() {
        let row = first_row(
            "company_id,name,description,company_size,state,country,city\n\
             482913.0,Acme,Widgets,3,TX,,Austin\n",
        );
        let candidate = OrganizationCandidate::from_row(&row).unwrap();

        assert_eq!(candidate.external_id, 482913);
        assert_eq!(candidate.name, "Acme");
        assert_eq!(candidate.location, "Austin, TX");
    }

    #[test]
    fn test_candidate_absent_name_is_empty() {
        let row = first_row("company_id,name\n7,\n");
        let candidate = OrganizationCandidate::from_row(&row).unwrap();
        assert_eq!(candidate.name, "");
        assert_eq!(candidate.location, "");
    }

    #[test]
    fn test_candidate_bad_id_skipped() {
        let row = first_row("company_id,name\nACME-1,Acme\n");
        assert_eq!(
            OrganizationCandidate::from_row(&row),
            Err(SkipReason::UnparsableExternalId("ACME-1".to_string()))
        );

        let row = first_row("company_id,name\n,Acme\n");
        assert_eq!(
            OrganizationCandidate::from_row(&row),
            Err(SkipReason::MissingExternalId)
        );
    }

    #[tokio::test]
    async fn test_duplicate_rows_within_file() {
        let pool = init_memory_database().await.unwrap();
        let gateway = SqliteGateway::new(pool.clone(), 500);
        let locks = KeyLocks::new();

        let report = OrganizationReconciler::new(&gateway, &locks)
            .import_organizations(source("company_id,name\n1,A\n1,A again\n2,B\n"))
            .await
            .unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_existing, 1);
        drop(gateway);
        assert_eq!(count_organizations(&pool).await.unwrap(), 2);
    }
}
