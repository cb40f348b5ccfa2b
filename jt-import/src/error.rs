//! Error types for jt-import
//!
//! `ImportError` is what the pipeline reports; `ApiError` is what HTTP
//! handlers return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which source file a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Organizations,
    Postings,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Organizations => write!(f, "organizations"),
            Stage::Postings => write!(f, "postings"),
        }
    }
}

/// Fatal import failures
///
/// Row-level problems never surface here; they are skipped and counted.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Source file absent (checked before any row is read)
    #[error("{stage} source file not found: {}", path.display())]
    SourceNotFound { stage: Stage, path: PathBuf },

    /// Source file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Store write, lookup or commit failed
    #[error("Store error: {0}")]
    Store(#[from] jt_common::Error),
}

impl ImportError {
    /// True for the "file not found" failure class
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImportError::SourceNotFound { .. })
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Authentication failed (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but lacking the required role (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409) - an import is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// jt-common error
    #[error("Common error: {0}")]
    Common(#[from] jt_common::Error),
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::SourceNotFound { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(format!("Import processing failed: {}", other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
