//! Import pipeline services

pub mod import_orchestrator;
pub mod key_locks;
pub mod organization_reconciler;
pub mod posting_reconciler;
pub mod row_decoder;

pub use import_orchestrator::{ImportOrchestrator, ImportSummary};
pub use key_locks::KeyLocks;
pub use organization_reconciler::OrganizationReconciler;
pub use posting_reconciler::PostingReconciler;
pub use row_decoder::{DecodedRow, Field, RowSource};

use futures::future::{self, Either};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::io::Read;
use thiserror::Error;
use tracing::debug;

use crate::error::ImportError;
use row_decoder::SourceItem;

/// Why a row was skipped without touching the store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("record could not be decoded: {0}")]
    Malformed(String),

    #[error("missing external id")]
    MissingExternalId,

    #[error("unparsable external id {0:?}")]
    UnparsableExternalId(String),

    #[error("missing organization reference")]
    MissingOrganizationRef,

    #[error("unparsable organization reference {0:?}")]
    UnparsableOrganizationRef(String),

    #[error("missing title")]
    MissingTitle,
}

/// What reconciliation did with one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    /// External id already stored (first write wins)
    SkippedExisting,
    SkippedInvalid(SkipReason),
}

/// Per-stage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub rows_read: usize,
    pub inserted: usize,
    pub skipped_invalid: usize,
    pub skipped_existing: usize,
    pub placeholders_created: usize,
}

/// Feed every row of `source` through `reconcile`, at most `max_concurrent` at a time
///
/// Records the decoder cannot read are counted as invalid skips. The first
/// `Err` (I/O or store) stops the stage; rows still in flight are dropped.
pub(crate) async fn drive_rows<R, F, Fut>(
    source: RowSource<R>,
    max_concurrent: usize,
    mut reconcile: F,
) -> Result<StageReport, ImportError>
where
    R: Read,
    F: FnMut(DecodedRow) -> Fut,
    Fut: Future<Output = Result<RowOutcome, ImportError>>,
{
    let outcomes = futures::stream::iter(source.items())
        .map(|item| match item {
            Ok(SourceItem::Row(row)) => {
                let line = row.line();
                Either::Left(reconcile(row).map(move |outcome| outcome.map(|o| (line, o))))
            }
            Ok(SourceItem::Malformed { line, reason }) => Either::Right(future::ready(Ok((
                line,
                RowOutcome::SkippedInvalid(SkipReason::Malformed(reason)),
            )))),
            Err(err) => Either::Right(future::ready(Err(err))),
        })
        .buffer_unordered(max_concurrent.max(1));
    futures::pin_mut!(outcomes);

    let mut report = StageReport::default();
    while let Some(outcome) = outcomes.next().await {
        let (line, outcome) = outcome?;
        report.rows_read += 1;
        match outcome {
            RowOutcome::Inserted => report.inserted += 1,
            RowOutcome::SkippedExisting => report.skipped_existing += 1,
            RowOutcome::SkippedInvalid(reason) => {
                debug!(line, %reason, "Row skipped");
                report.skipped_invalid += 1;
            }
        }
    }

    Ok(report)
}
