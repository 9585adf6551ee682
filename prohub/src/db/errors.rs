use crate::types::Operation;
use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Entity cannot be modified or deleted due to protection rules
    /// NOTE: use this only for DB-level protection rules, not user roles etc. - that's handled at
    /// the API layer.
    #[error("{operation:?} cannot be applied to entity of type {entity_type}: {reason}")]
    ProtectedEntity {
        operation: Operation,
        reason: String,
        entity_type: String,
        entity_id: Option<String>,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().map(|s| s.to_string());
                let table = db_err.table().map(|s| s.to_string());
                let message = db_err.message().to_string();

                if db_err.is_unique_violation() {
                    DbError::UniqueViolation { constraint, table, message }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation { constraint, table, message }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation { constraint, table, message }
                } else {
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

impl DbError {
    /// Whether this is a unique violation on the named constraint
    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, DbError::UniqueViolation { constraint: Some(c), .. } if c == name)
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
