use crate::db::errors::DbError;
use crate::types::{Operation, Permission};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Field-level validation failure, every failed rule is reported
    #[error("{message}: {}", errors.join(", "))]
    Validation { message: String, errors: Vec<String> },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict with existing state, e.g. an overlapping slot or a double booking
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Request body exceeds a configured limit
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// A feature is disabled or an upstream dependency is unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Map a unique constraint to a user-facing message and the resource it concerns
fn describe_unique_violation(table: Option<&str>, constraint: Option<&str>) -> (&'static str, &'static str) {
    match (table, constraint) {
        (Some("users"), Some(c)) if c.contains("email") => ("An account with this email address already exists", "user"),
        (Some("users"), Some(c)) if c.contains("external_user_id") => ("This external account is already linked", "user"),
        (Some("professionals"), Some(c)) if c.contains("user_id") => ("This user already has a professional profile", "professional"),
        (Some("categories"), Some(c)) if c.contains("name") => ("A category with this name already exists", "category"),
        (Some("reviews"), Some(c)) if c.contains("reservation_id") => ("This reservation has already been reviewed", "review"),
        (Some("subscriptions"), _) => ("A subscription already exists", "subscription"),
        (Some("payments"), _) => ("This payment has already been recorded", "payment"),
        _ => ("Resource already exists", "unknown"),
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ProtectedEntity { .. } => StatusCode::FORBIDDEN,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::Validation { message, .. } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Conflict { message } => message.clone(),
            Error::PayloadTooLarge { message } => message.clone(),
            Error::ServiceUnavailable { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => {
                    describe_unique_violation(table.as_deref(), constraint.as_deref()).0.to_string()
                }
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::ProtectedEntity {
                    operation,
                    entity_type,
                    reason,
                    ..
                } => {
                    format!("Cannot {operation:?} {entity_type}: {reason}")
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::Validation { .. } | Error::NotFound { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::ServiceUnavailable { .. } => {
                tracing::warn!("Service unavailable: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Validation { message, errors } => (status, Json(json!({ "message": message, "errors": errors }))).into_response(),
            Error::BadRequest { message } | Error::Conflict { message } => (status, Json(json!({ "message": message }))).into_response(),
            // Handle database unique violations with minimal structured JSON
            Error::Database(DbError::UniqueViolation { constraint, table, .. }) => {
                let (message, resource) = describe_unique_violation(table.as_deref(), constraint.as_deref());
                (status, Json(json!({ "message": message, "resource": resource }))).into_response()
            }
            _ => {
                let user_message = self.user_message();
                (status, user_message).into_response()
            }
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
