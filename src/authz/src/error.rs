//! Error types for the policy engine

use thiserror::Error;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A dimension name or policy id does not resolve to a row
    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert of a policy tuple (or dimension name) that already exists
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Underlying persistence unavailable or corrupted
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthzError {
    /// Whether the error must abort the surrounding operation.
    ///
    /// A `ConstraintViolation` only escapes the reconciler's grant path when two
    /// writers raced on the same tuple, so it is treated like a storage failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthzError::Storage(_) | AuthzError::ConstraintViolation(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for AuthzError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AuthzError::ConstraintViolation(db.message().to_string())
            }
            sqlx::Error::RowNotFound => AuthzError::NotFound(err.to_string()),
            _ => AuthzError::Storage(err.to_string()),
        }
    }
}

/// Result type for policy engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;
