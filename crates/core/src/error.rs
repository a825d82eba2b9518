//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, authorization). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key was already taken (e.g. an order number). Callers that
    /// generate the key optimistically may regenerate and retry a bounded
    /// number of times; any other persistence failure must not be retried.
    #[error("uniqueness conflict: {0}")]
    UniquenessConflict(String),

    /// Tenant-scope authorization failure: the ambient context does not
    /// permit the attempted access (e.g. a store-scoped operation without a
    /// store id). Never retried.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A stock operation asked for more than is available. Carries both
    /// sides so callers can display or re-plan.
    #[error("insufficient stock: required {required}, available {available}")]
    InsufficientStock { required: i64, available: i64 },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::UniquenessConflict(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn insufficient_stock(required: i64, available: i64) -> Self {
        Self::InsufficientStock {
            required,
            available,
        }
    }

    /// Whether a bounded regenerate-and-retry loop is appropriate for this
    /// error. Only uniqueness conflicts qualify.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, Self::UniquenessConflict(_))
    }
}
