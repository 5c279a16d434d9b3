//! Common error types for IMGQ

use thiserror::Error;

/// Common result type for IMGQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by core operations
///
/// "No more work" is deliberately absent: it is a normal outcome and is
/// modelled as `NextWork::AllComplete` by the assignment ledger.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown image, assignment or user
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource is owned by another user, or caller lacks the admin role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or ambiguous submission
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Credential check failed
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Lost a race for the same resource; caller may retry
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Seed ingestion failure
    #[error("Load error: {0}")]
    Load(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// SQLite primary/extended result codes for SQLITE_BUSY and SQLITE_LOCKED
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

impl Error {
    /// Map a failed write into the taxonomy.
    ///
    /// Unique-constraint violations mean the caller raced another writer for
    /// the same row and become `Conflict`. Everything else stays a database
    /// error (busy errors remain retryable, see `is_retryable`).
    pub fn from_write(err: sqlx::Error, context: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Error::Conflict(format!("{}: already exists", context));
            }
        }
        Error::Database(err)
    }

    /// Whether retrying the whole transaction may succeed
    ///
    /// True only for writer-lock contention (SQLITE_BUSY / SQLITE_LOCKED,
    /// including stale WAL snapshots).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(err) => is_busy(err),
            _ => false,
        }
    }

    /// Whether this error means the schema is missing a table
    pub fn is_missing_table(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                db_err.message().contains("no such table")
            }
            _ => false,
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code_busy = db_err
                .code()
                .map(|code| BUSY_CODES.contains(&code.as_ref()))
                .unwrap_or(false);
            code_busy || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_database_errors_are_retryable() {
        assert!(!Error::Conflict("x".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!Error::Forbidden("x".into()).is_retryable());
    }

    #[test]
    fn test_non_database_errors_are_not_missing_table() {
        assert!(!Error::Internal("no such table: images".into()).is_missing_table());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::InvalidPayload("empty".into()).to_string(),
            "Invalid payload: empty"
        );
        assert_eq!(Error::Conflict("lost".into()).to_string(), "Conflict: lost");
    }
}
