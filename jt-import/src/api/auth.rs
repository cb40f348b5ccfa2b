//! Authorization gate for administrative routes
//!
//! Request bodies must carry `timestamp` and `hash` (see
//! `jt_common::api::auth`) plus the caller's `username` and `password`. The
//! account must hold the `Admin` role. A shared secret of 0 turns the whole
//! gate off.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jt_common::accounts::{authenticate, user_has_role};
use jt_common::api::auth::{validate_hash, validate_timestamp, ApiAuthError};
use jt_common::bootstrap::ADMIN_ROLE;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Upper bound on a request body read for validation
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AuthFields {
    timestamp: i64,
    hash: String,
    username: String,
    password: String,
}

/// Validate timestamp, hash and Admin credentials before the handler runs
///
/// The body is buffered, checked, and handed on unchanged.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let auth_fields: AuthFields = serde_json::from_value(json_value.clone())
        .map_err(|e| ApiError::BadRequest(format!("Missing auth fields: {}", e)))?;

    validate_timestamp(auth_fields.timestamp).map_err(|e| match e {
        ApiAuthError::InvalidTimestamp { reason, .. } => ApiError::Unauthorized(reason),
        other => ApiError::Internal(other.to_string()),
    })?;

    validate_hash(&auth_fields.hash, &json_value, state.shared_secret).map_err(|e| match e {
        ApiAuthError::InvalidHash { provided, calculated } => {
            warn!(provided = %provided, calculated = %calculated, "Hash validation failed");
            ApiError::Unauthorized("Invalid hash".to_string())
        }
        other => ApiError::Internal(other.to_string()),
    })?;

    if !authenticate(&state.db, &auth_fields.username, &auth_fields.password).await? {
        warn!(username = %auth_fields.username, "Credential check failed");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    if !user_has_role(&state.db, &auth_fields.username, ADMIN_ROLE).await? {
        warn!(username = %auth_fields.username, "Import refused: missing Admin role");
        return Err(ApiError::Forbidden(format!("Role '{}' required", ADMIN_ROLE)));
    }

    debug!(username = %auth_fields.username, "Admin request authorized");

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}
