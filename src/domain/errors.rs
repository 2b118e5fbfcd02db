//! Domain error types
//!
//! These errors are framework-agnostic and represent business-level failures.
//! The HTTP mapping lives in `api::error`.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Resource not found
    #[error("{0}")]
    NotFound(String),
    /// Malformed or out-of-range input
    #[error("{0}")]
    Validation(String),
    /// Uniqueness violation (duplicate ISBN, email, matric number...)
    #[error("{0}")]
    Conflict(String),
    /// Caller is identified but not allowed to perform the action
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BorrowLimitExceeded(String),
    #[error("{0}")]
    CopyUnavailable(String),
    #[error("{0}")]
    AlreadyReturned(String),
    #[error("{0}")]
    AlreadyExtended(String),
    /// Operation not allowed in the entity's current state
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Unauthorized(String),
    /// Database/persistence error
    #[error("Database error: {0}")]
    Database(String),
    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound(format!("{} {} not found", kind, id))
    }

    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::BorrowLimitExceeded(_) => "BORROW_LIMIT_EXCEEDED",
            DomainError::CopyUnavailable(_) => "COPY_UNAVAILABLE",
            DomainError::AlreadyReturned(_) => "ALREADY_RETURNED",
            DomainError::AlreadyExtended(_) => "ALREADY_EXTENDED",
            DomainError::InvalidState(_) => "INVALID_STATE",
            DomainError::Unauthorized(_) => "UNAUTHORIZED",
            DomainError::Database(_) => "DATABASE_ERROR",
            DomainError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Conversion from SeaORM errors (used in infrastructure layer)
impl From<DbErr> for DomainError {
    fn from(e: DbErr) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                DomainError::Conflict(format!("Duplicate value: {}", detail))
            }
            _ => DomainError::Database(e.to_string()),
        }
    }
}
