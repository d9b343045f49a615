use thiserror::Error;

/// Storage failure.
#[derive(Debug, Error)]
pub enum DbError {
    /// A unique key is already taken: a PGT IOU delivered twice, or a
    /// service ticket already mapped to a session.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input rejected before reaching storage.
    #[error("Validation error: {0}")]
    Validation(String),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;
