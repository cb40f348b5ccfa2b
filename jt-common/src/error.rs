//! Common error types for JobTrack

use thiserror::Error;

/// Common result type for JobTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across JobTrack services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when SQLite reported lock contention ("database is locked" / busy)
    pub fn is_database_locked(&self) -> bool {
        match self {
            Error::Database(db_err) => {
                let msg = db_err.to_string();
                msg.contains("database is locked") || msg.contains("database is busy")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_detected() {
        let locked = Error::Database(sqlx::Error::Protocol("database is locked".to_string()));
        assert!(locked.is_database_locked());

        assert!(!Error::Internal("database is locked".to_string()).is_database_locked());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_database_locked());
    }
}
