//! Persistence gateway
//!
//! Reconcilers see the store only through `PersistenceGateway`. The SQLite
//! implementation batches writes in one transaction; the table modules hold
//! the individual queries.

pub mod batch;
pub mod organizations;
pub mod postings;
pub mod sqlite_gateway;

use async_trait::async_trait;
use jt_common::db::{NewOrganization, NewPosting, Organization, Posting};
use jt_common::Result;

pub use organizations::count as count_organizations;
pub use postings::count as count_postings;
pub use sqlite_gateway::SqliteGateway;

/// Lookup, insert and commit against the reference-data store
///
/// Callers serialize check-then-insert per external id; the unique
/// constraints back that up, so an insert that loses a race returns `None`
/// instead of creating a duplicate.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn find_organization_by_external_id(&self, external_id: i64)
        -> Result<Option<Organization>>;

    /// `None` when an organization with this external id already exists
    async fn insert_organization(&self, org: &NewOrganization) -> Result<Option<Organization>>;

    async fn find_posting_by_external_id(&self, external_id: &str) -> Result<Option<Posting>>;

    /// `None` when a posting with this external id already exists
    async fn insert_posting(&self, posting: &NewPosting) -> Result<Option<Posting>>;

    /// Make every write so far durable and visible to all readers
    async fn commit(&self) -> Result<()>;
}
