//! Posting table operations

use jt_common::db::{NewPosting, Posting};
use jt_common::{Error, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Salaries live in TEXT columns; parse them back into `Decimal`
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|text| {
        text.parse::<Decimal>().map_err(|e| {
            Error::Internal(format!("Stored {} '{}' is not a decimal: {}", column, text, e))
        })
    })
    .transpose()
}

/// Load posting by external id
pub async fn find_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<Posting>> {
    let row = sqlx::query(
        r#"
        SELECT id, external_id, title, location, employment_type, seniority_level,
               salary_min, salary_max, posted_at, organization_id
        FROM postings
        WHERE external_id = ?
        "#,
    )
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(Posting {
            id: row.get("id"),
            external_id: row.get("external_id"),
            title: row.get("title"),
            location: row.get("location"),
            employment_type: row.get("employment_type"),
            seniority_level: row.get("seniority_level"),
            salary_min: decimal_column(&row, "salary_min")?,
            salary_max: decimal_column(&row, "salary_max")?,
            posted_at: row.try_get("posted_at")?,
            organization_id: row.get("organization_id"),
        })),
        None => Ok(None),
    }
}

/// Insert posting unless its external id is already stored
///
/// Returns `None` when the unique key was already taken. The owning
/// organization must exist; the foreign key rejects anything else.
pub async fn insert(conn: &mut SqliteConnection, posting: &NewPosting) -> Result<Option<Posting>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO postings (
            external_id, title, location, employment_type, seniority_level,
            salary_min, salary_max, posted_at, organization_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&posting.external_id)
    .bind(&posting.title)
    .bind(&posting.location)
    .bind(&posting.employment_type)
    .bind(&posting.seniority_level)
    .bind(posting.salary_min.map(|d| d.to_string()))
    .bind(posting.salary_max.map(|d| d.to_string()))
    .bind(posting.posted_at)
    .bind(posting.organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id.map(|id| Posting {
        id,
        external_id: posting.external_id.clone(),
        title: posting.title.clone(),
        location: posting.location.clone(),
        employment_type: posting.employment_type.clone(),
        seniority_level: posting.seniority_level.clone(),
        salary_min: posting.salary_min,
        salary_max: posting.salary_max,
        posted_at: posting.posted_at,
        organization_id: posting.organization_id,
    }))
}

/// Number of stored postings
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM postings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
