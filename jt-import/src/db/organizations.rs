//! Organization table operations

use jt_common::db::{NewOrganization, Organization};
use jt_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

fn from_row(row: &SqliteRow) -> Organization {
    Organization {
        id: row.get("id"),
        external_id: row.get("external_id"),
        name: row.get("name"),
        location: row.get("location"),
        industry: row.get("industry"),
    }
}

/// Load organization by external id
pub async fn find_by_external_id(
    conn: &mut SqliteConnection,
    external_id: i64,
) -> Result<Option<Organization>> {
    let row = sqlx::query(
        r#"
        SELECT id, external_id, name, location, industry
        FROM organizations
        WHERE external_id = ?
        "#,
    )
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(from_row))
}

/// Insert organization unless its external id is already stored
///
/// Returns `None` when the unique key was already taken.
pub async fn insert(
    conn: &mut SqliteConnection,
    org: &NewOrganization,
) -> Result<Option<Organization>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO organizations (external_id, name, location, industry)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(external_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(org.external_id)
    .bind(&org.name)
    .bind(&org.location)
    .bind(&org.industry)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id.map(|id| Organization {
        id,
        external_id: org.external_id,
        name: org.name.clone(),
        location: org.location.clone(),
        industry: org.industry.clone(),
    }))
}

/// Number of stored organizations
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
