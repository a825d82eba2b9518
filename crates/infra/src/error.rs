//! Infrastructure error model and sqlx error mapping.

use thiserror::Error;

use storekeep_core::DomainError;

/// Result type used across the infrastructure layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure-level error: either a domain failure surfaced through a
/// store, or a storage fault (connection loss, malformed row, …).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    /// The domain failure, when this error carries one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            Self::Storage { .. } => None,
        }
    }
}

/// Map sqlx errors onto the taxonomy.
///
/// Postgres `23505` (unique violation) becomes the retryable
/// [`DomainError::UniquenessConflict`]; `23514` (check constraint) means a
/// write tried to break a database-enforced invariant. Everything else is
/// an opaque storage fault — deliberately *not* a conflict, so optimistic
/// retry loops never spin on infrastructure failures.
pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::Domain(DomainError::conflict(format!(
                "unique violation in {operation}: {}",
                db_err.message()
            ))),
            Some("23514") => StoreError::Domain(DomainError::invariant(format!(
                "check constraint violated in {operation}: {}",
                db_err.message()
            ))),
            _ => StoreError::storage(operation, db_err.message().to_string()),
        },
        sqlx::Error::PoolClosed => StoreError::storage(operation, "connection pool closed"),
        other => StoreError::storage(operation, other.to_string()),
    }
}
