//! End-to-end tests for the import pipeline
//!
//! Each test writes its source files into a temp dir and imports them into a
//! private in-memory store.

use async_trait::async_trait;
use jt_common::config::ImportSettings;
use jt_common::db::{
    init_database, init_memory_database, NewOrganization, NewPosting, Organization, Posting,
};
use jt_common::events::{EventBus, JtEvent};
use jt_import::db::{count_organizations, count_postings, PersistenceGateway, SqliteGateway};
use jt_import::{ImportError, ImportOrchestrator, Stage};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const ORG_HEADER: &str =
    "company_id,name,description,company_size,state,country,city,zip_code,address,url";
const POSTING_HEADER: &str = "job_id,company_id,title,description,max_salary,med_salary,\
                              min_salary,pay_period,formatted_work_type,location,\
                              applies,formatted_experience_level";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn organizations(&self, name: &str, rows: &[&str]) -> PathBuf {
        self.write(name, ORG_HEADER, rows)
    }

    fn postings(&self, name: &str, rows: &[&str]) -> PathBuf {
        self.write(name, POSTING_HEADER, rows)
    }

    fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, header: &str, rows: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut content = String::from(header);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn settings(max_concurrent_rows: usize) -> ImportSettings {
    ImportSettings {
        max_concurrent_rows,
        ..ImportSettings::default()
    }
}

async fn orchestrator(max_concurrent_rows: usize) -> (SqlitePool, ImportOrchestrator, EventBus) {
    let pool = init_memory_database().await.unwrap();
    let bus = EventBus::new(64);
    let orchestrator = ImportOrchestrator::new(pool.clone(), bus.clone(), settings(max_concurrent_rows));
    (pool, orchestrator, bus)
}

async fn organization(pool: &SqlitePool, external_id: i64) -> Option<(i64, String, Option<String>)> {
    sqlx::query("SELECT id, name, location FROM organizations WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .unwrap()
        .map(|row| (row.get("id"), row.get("name"), row.get("location")))
}

async fn posting_owner(pool: &SqlitePool, external_id: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT organization_id FROM postings WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_organization_import_is_idempotent() {
    let fx = Fixture::new();
    let orgs = fx.organizations(
        "companies.csv",
        &[
            "1,Acme,,,TX,US,Austin,,,",
            "2,Beta,,,,,,,,",
            "3,Gamma,,,CA,,,,,",
        ],
    );
    let posts = fx.postings("job_postings.csv", &[]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let first = orchestrator.run(&orgs, &posts).await.unwrap();
    let second = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(first.organizations_imported, 3);
    assert_eq!(second.organizations_imported, 0);
    assert_eq!(second.organizations.skipped_existing, 3);
    assert_eq!(count_organizations(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_forward_reference_creates_single_placeholder() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings(
        "job_postings.csv",
        &[
            "J-1,77,Engineer,,,,,,Full-time,Remote,0,Entry level",
            "J-2,77.0,Analyst,,,,,,,,,",
        ],
    );
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let summary = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(summary.jobs_imported, 2);
    assert_eq!(summary.postings.placeholders_created, 1);

    let (placeholder_id, name, location) = organization(&pool, 77).await.unwrap();
    assert_eq!(name, "Organization 77");
    assert_eq!(location, None);
    assert_eq!(posting_owner(&pool, "J-1").await, Some(placeholder_id));
    assert_eq!(posting_owner(&pool, "J-2").await, Some(placeholder_id));
}

#[tokio::test]
async fn test_real_organization_after_placeholder_is_not_duplicated() {
    let fx = Fixture::new();
    let empty_orgs = fx.organizations("none.csv", &[]);
    let posts = fx.postings("job_postings.csv", &["J-1,77,Engineer,,,,,,,,,"]);
    let real_orgs = fx.organizations("companies.csv", &["77,Real Name,,,TX,,Austin,,,"]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    orchestrator.run(&empty_orgs, &posts).await.unwrap();
    let summary = orchestrator.run(&real_orgs, &posts).await.unwrap();

    assert_eq!(summary.organizations_imported, 0);
    assert_eq!(summary.jobs_imported, 0);
    assert_eq!(count_organizations(&pool).await.unwrap(), 1);

    // First write wins: the placeholder is not renamed
    let (_, name, _) = organization(&pool, 77).await.unwrap();
    assert_eq!(name, "Organization 77");
}

#[tokio::test]
async fn test_malformed_rows_skipped_others_imported() {
    let fx = Fixture::new();
    let orgs = fx.organizations(
        "companies.csv",
        &[
            "1,Acme,,,,,,,,",
            "abc,Broken,,,,,,,,",
            ",No Id,,,,,,,,",
            "4,Delta,,,,,,,,",
        ],
    );
    let posts = fx.postings("job_postings.csv", &[]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let summary = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(summary.organizations_imported, 2);
    assert_eq!(summary.organizations.rows_read, 4);
    assert_eq!(summary.organizations.skipped_invalid, 2);
    assert_eq!(count_organizations(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_location_join_and_numeric_noise() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["482913.0,Acme,,,TX,,Austin,,,"]);
    let posts = fx.postings("job_postings.csv", &[]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    orchestrator.run(&orgs, &posts).await.unwrap();

    let (_, name, location) = organization(&pool, 482913).await.unwrap();
    assert_eq!(name, "Acme");
    assert_eq!(location.as_deref(), Some("Austin, TX"));
}

#[tokio::test]
async fn test_missing_title_not_counted() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings(
        "job_postings.csv",
        &["J-1,1,   ,,,,,,,,,", "J-2,1,Engineer,,,,,,,,,", "J-3,x,Engineer,,,,,,,,,"],
    );
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let summary = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(summary.jobs_imported, 1);
    assert_eq!(summary.postings.skipped_invalid, 2);
    assert_eq!(count_postings(&pool).await.unwrap(), 1);
    assert!(posting_owner(&pool, "J-1").await.is_none());
}

#[tokio::test]
async fn test_salaries_parsed_independently() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings("job_postings.csv", &["J-1,1,Engineer,,lots,,85000.50,,,,,"]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    orchestrator.run(&orgs, &posts).await.unwrap();

    let row = sqlx::query("SELECT salary_min, salary_max FROM postings WHERE external_id = 'J-1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    let salary_min: Option<String> = row.get("salary_min");
    let salary_max: Option<String> = row.get("salary_max");
    assert_eq!(salary_min.as_deref(), Some("85000.50"));
    assert_eq!(salary_max, None);
}

#[tokio::test]
async fn test_missing_organization_file_is_not_found() {
    let fx = Fixture::new();
    let posts = fx.postings("job_postings.csv", &["J-1,77,Engineer,,,,,,,,,"]);
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let err = orchestrator
        .run(&fx.missing("companies.csv"), &posts)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(err, ImportError::SourceNotFound { stage: Stage::Organizations, .. }));
    // The posting stage never ran
    assert_eq!(count_postings(&pool).await.unwrap(), 0);
    assert_eq!(count_organizations(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_rows_with_duplicates() {
    let fx = Fixture::new();

    let mut org_rows = Vec::new();
    for id in 1..=20 {
        org_rows.push(format!("{},Org {},,,,,,,,", id, id));
        org_rows.push(format!("{}.0,Org {} again,,,,,,,,", id, id));
    }
    let org_refs: Vec<&str> = org_rows.iter().map(String::as_str).collect();
    let orgs = fx.organizations("companies.csv", &org_refs);

    let mut posting_rows = Vec::new();
    for n in 0..40 {
        // Half reference known organizations, half share one unknown id
        let org = if n % 2 == 0 { (n % 20 + 1).to_string() } else { "900".to_string() };
        posting_rows.push(format!("J-{},{},Role {},,,,,,,,,", n, org, n));
        posting_rows.push(format!("J-{},{},Role {} duplicate,,,,,,,,,", n, org, n));
    }
    let posting_refs: Vec<&str> = posting_rows.iter().map(String::as_str).collect();
    let posts = fx.postings("job_postings.csv", &posting_refs);

    let (pool, orchestrator, _bus) = orchestrator(8).await;
    let summary = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(summary.organizations_imported, 20);
    assert_eq!(summary.organizations.skipped_existing, 20);
    assert_eq!(summary.jobs_imported, 40);
    assert_eq!(summary.postings.skipped_existing, 40);
    assert_eq!(summary.postings.placeholders_created, 1);
    assert_eq!(count_organizations(&pool).await.unwrap(), 21);
    assert_eq!(count_postings(&pool).await.unwrap(), 40);
}

#[tokio::test]
async fn test_file_backed_store_survives_reopen() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings("job_postings.csv", &["J-1,2,Engineer,,,,,,,,,"]);
    let db_path = fx.dir.path().join("jobtrack.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        let orchestrator = ImportOrchestrator::new(pool.clone(), EventBus::new(8), settings(4));
        let summary = orchestrator.run(&orgs, &posts).await.unwrap();
        assert_eq!(summary.organizations_imported, 1);
        assert_eq!(summary.jobs_imported, 1);
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();
    let orchestrator = ImportOrchestrator::new(pool.clone(), EventBus::new(8), settings(4));
    let summary = orchestrator.run(&orgs, &posts).await.unwrap();

    assert_eq!(summary.organizations_imported, 0);
    assert_eq!(summary.jobs_imported, 0);
    assert_eq!(count_organizations(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_events_for_successful_run() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings("job_postings.csv", &["J-1,1,Engineer,,,,,,,,,"]);
    let (_pool, orchestrator, bus) = orchestrator(1).await;
    let mut rx = bus.subscribe();

    orchestrator.run(&orgs, &posts).await.unwrap();

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type().to_string());
    }
    assert_eq!(
        types,
        vec!["ImportStarted", "OrganizationsImported", "PostingsChanged", "ImportCompleted"]
    );

    // Rerun inserts no postings, so no PostingsChanged
    orchestrator.run(&orgs, &posts).await.unwrap();
    let mut rerun = Vec::new();
    while let Ok(event) = rx.try_recv() {
        rerun.push(event);
    }
    assert!(!rerun.iter().any(|e| matches!(e, JtEvent::PostingsChanged { .. })));
}

/// Delegates to SQLite but fails the Nth posting insert, or any insert of
/// the given organization external id
struct FailingGateway {
    inner: SqliteGateway,
    fail_on_posting: usize,
    posting_inserts: AtomicUsize,
    fail_on_organization: Option<i64>,
}

impl FailingGateway {
    fn new(inner: SqliteGateway) -> Self {
        Self {
            inner,
            fail_on_posting: 0,
            posting_inserts: AtomicUsize::new(0),
            fail_on_organization: None,
        }
    }
}

#[async_trait]
impl PersistenceGateway for FailingGateway {
    async fn find_organization_by_external_id(
        &self,
        external_id: i64,
    ) -> jt_common::Result<Option<Organization>> {
        self.inner.find_organization_by_external_id(external_id).await
    }

    async fn insert_organization(
        &self,
        org: &NewOrganization,
    ) -> jt_common::Result<Option<Organization>> {
        if self.fail_on_organization == Some(org.external_id) {
            return Err(jt_common::Error::Internal(
                "placeholder write failed".to_string(),
            ));
        }
        self.inner.insert_organization(org).await
    }

    async fn find_posting_by_external_id(
        &self,
        external_id: &str,
    ) -> jt_common::Result<Option<Posting>> {
        self.inner.find_posting_by_external_id(external_id).await
    }

    async fn insert_posting(&self, posting: &NewPosting) -> jt_common::Result<Option<Posting>> {
        let n = self.posting_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_posting {
            return Err(jt_common::Error::Internal("disk full".to_string()));
        }
        self.inner.insert_posting(posting).await
    }

    async fn commit(&self) -> jt_common::Result<()> {
        self.inner.commit().await
    }
}

#[tokio::test]
async fn test_store_failure_aborts_run() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings(
        "job_postings.csv",
        &[
            "J-1,1,Engineer,,,,,,,,,",
            "J-2,1,Analyst,,,,,,,,,",
            "J-3,1,Manager,,,,,,,,,",
        ],
    );
    let (pool, orchestrator, bus) = orchestrator(1).await;
    let mut rx = bus.subscribe();

    let gateway = FailingGateway {
        fail_on_posting: 2,
        ..FailingGateway::new(SqliteGateway::new(pool.clone(), 500))
    };

    let err = orchestrator
        .run_with_gateway(&gateway, &orgs, &posts)
        .await
        .unwrap_err();
    drop(gateway);

    assert!(matches!(err, ImportError::Store(_)));
    assert!(!err.is_not_found());

    // Organization stage committed; the uncommitted posting batch was discarded
    assert_eq!(count_organizations(&pool).await.unwrap(), 1);
    assert_eq!(count_postings(&pool).await.unwrap(), 0);

    let mut failed = None;
    while let Ok(event) = rx.try_recv() {
        if let JtEvent::ImportFailed { not_found, message, .. } = event {
            failed = Some((not_found, message));
        }
    }
    let (not_found, message) = failed.unwrap();
    assert!(!not_found);
    assert!(message.contains("disk full"));
}

#[tokio::test]
async fn test_placeholder_failure_blocks_dependent_posting() {
    let fx = Fixture::new();
    let orgs = fx.organizations("companies.csv", &["1,Acme,,,,,,,,"]);
    let posts = fx.postings(
        "job_postings.csv",
        &["J-1,1,Engineer,,,,,,,,,", "J-2,99,Analyst,,,,,,,,,"],
    );
    let (pool, orchestrator, _bus) = orchestrator(1).await;

    let gateway = FailingGateway {
        fail_on_organization: Some(99),
        ..FailingGateway::new(SqliteGateway::new(pool.clone(), 500))
    };

    let err = orchestrator
        .run_with_gateway(&gateway, &orgs, &posts)
        .await
        .unwrap_err();
    drop(gateway);

    assert!(matches!(err, ImportError::Store(_)));
    assert!(err.to_string().contains("placeholder write failed"));

    // Neither the placeholder nor the posting that depends on it was stored
    let dependent: Option<String> =
        sqlx::query_scalar("SELECT external_id FROM postings WHERE external_id = 'J-2'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert!(dependent.is_none());

    assert!(organization(&pool, 99).await.is_none());
    assert_eq!(count_organizations(&pool).await.unwrap(), 1);
}
