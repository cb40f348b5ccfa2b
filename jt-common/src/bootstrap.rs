//! Startup bootstrap for roles, the administrator account and the API secret
//!
//! Everything here uses `INSERT OR IGNORE`, so running it on every start (or
//! from several processes at once) never creates duplicates.

use crate::accounts::hash_password;
use crate::api::auth::load_shared_secret;
use crate::config::AdminSeed;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Role required to trigger imports over HTTP
pub const ADMIN_ROLE: &str = "Admin";

/// Default role for ordinary accounts
pub const USER_ROLE: &str = "User";

/// What the bootstrap changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub roles_created: u64,
    pub admin_created: bool,
    /// Shared secret in effect after bootstrap
    pub shared_secret: i64,
}

/// Ensure roles, the optional administrator and the API secret exist
pub async fn ensure_roles_and_admin(
    pool: &SqlitePool,
    admin: Option<&AdminSeed>,
) -> Result<BootstrapOutcome> {
    let mut outcome = BootstrapOutcome::default();

    for role in [ADMIN_ROLE, USER_ROLE] {
        let result = sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(role)
            .execute(pool)
            .await?;
        outcome.roles_created += result.rows_affected();
    }

    if let Some(seed) = admin {
        outcome.admin_created = ensure_admin(pool, seed).await?;
    }

    outcome.shared_secret = load_shared_secret(pool)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    info!(
        roles_created = outcome.roles_created,
        admin_created = outcome.admin_created,
        "Bootstrap complete"
    );

    Ok(outcome)
}

async fn ensure_admin(pool: &SqlitePool, seed: &AdminSeed) -> Result<bool> {
    if seed.username.trim().is_empty() {
        return Err(Error::Config("admin.username must not be empty".to_string()));
    }

    let password = seed.password.clone();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))??;

    let created = sqlx::query("INSERT OR IGNORE INTO users (username, password_hash) VALUES (?, ?)")
        .bind(&seed.username)
        .bind(&hash)
        .execute(pool)
        .await?
        .rows_affected()
        > 0;

    // Membership is (re)asserted even when the account already existed
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_roles (user_id, role_name)
        SELECT id, ? FROM users WHERE username = ?
        "#,
    )
    .bind(ADMIN_ROLE)
    .bind(&seed.username)
    .execute(pool)
    .await?;

    Ok(created)
}
