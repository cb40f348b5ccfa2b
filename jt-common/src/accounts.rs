//! Account credentials and role membership
//!
//! Passwords are stored as Argon2id PHC strings (salt and parameters embedded),
//! so the `users` table needs only the one `password_hash` column.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;

use crate::{Error, Result};

/// Hash a password with Argon2id, returning the PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
///
/// A mismatch is `Ok(false)`; an unparsable stored hash is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| Error::Internal(format!("Stored password hash is malformed: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Internal(format!("Password verification failed: {}", e))),
    }
}

/// Verify `username`/`password` against the stored account
///
/// Unknown users and wrong passwords both yield `Ok(false)`. Argon2 runs on
/// the blocking pool.
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> Result<bool> {
    let stored: Option<String> =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    let Some(stored) = stored else {
        return Ok(false);
    };

    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| Error::Internal(format!("Password verification task failed: {}", e)))?
}

/// True when the user holds the given role
pub async fn user_has_role(pool: &SqlitePool, username: &str, role: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM user_roles ur
        JOIN users u ON u.id = ur.user_id
        WHERE u.username = ? AND ur.role_name = ?
        "#,
    )
    .bind(username)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
