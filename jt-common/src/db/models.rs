//! Database models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Organization row
///
/// `id` is the store-assigned surrogate key; `external_id` is the identity
/// carried by the source dataset and is unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub external_id: i64,
    pub name: String,
    pub location: Option<String>,
    pub industry: Option<String>,
}

/// Organization about to be inserted (no surrogate key yet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganization {
    pub external_id: i64,
    pub name: String,
    pub location: Option<String>,
    pub industry: Option<String>,
}

impl NewOrganization {
    /// Stand-in organization for a posting that references an unseen id
    ///
    /// Name is derived from the external id; location stays absent.
    pub fn placeholder(external_id: i64) -> Self {
        Self {
            external_id,
            name: placeholder_name(external_id),
            location: None,
            industry: None,
        }
    }
}

/// Deterministic name given to placeholder organizations
pub fn placeholder_name(external_id: i64) -> String {
    format!("Organization {}", external_id)
}

/// Posting row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub seniority_level: Option<String>,
    /// Stored as decimal text so no precision is lost
    pub salary_min: Option<Decimal>,
    pub salary_max: Option<Decimal>,
    pub posted_at: DateTime<Utc>,
    /// Surrogate id of the owning organization
    pub organization_id: i64,
}

/// Posting about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosting {
    pub external_id: String,
    pub title: String,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub seniority_level: Option<String>,
    pub salary_min: Option<Decimal>,
    pub salary_max: Option<Decimal>,
    pub posted_at: DateTime<Utc>,
    pub organization_id: i64,
}
