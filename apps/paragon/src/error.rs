//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Handler: Result<Json<T>, ApiError>                                     │
//! │       │                                                                 │
//! │       ├── DbError ──────► NOT_FOUND / CONFLICT / DATABASE_ERROR         │
//! │       ├── IngestError ──► VALIDATION_ERROR (bad receipt) / INTERNAL     │
//! │       └── MultipartError ► VALIDATION_ERROR                             │
//! │                                                                         │
//! │  Response: HTTP status from the code, body                              │
//! │    { "code": "NOT_FOUND", "message": "User not found: 7" }              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use paragon_db::DbError;
use paragon_ingest::IngestError;
use serde::Serialize;

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Resource already exists (409)
    Conflict,

    /// Upload carries more files than allowed (413)
    TooManyFiles,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::TooManyFiles => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ConstraintViolation { message } => ApiError::validation(message),
            DbError::InvalidValue(message) => ApiError::validation(message),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::QueryFailed(e) | DbError::Internal(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts pipeline errors to API errors.
impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Database(db) => db.into(),
            other if other.is_document_error() => ApiError::validation(other.to_string()),
            other => {
                tracing::error!("Ingestion failed: {}", other);
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use paragon_core::ParseError;

    #[test]
    fn test_db_error_mapping() {
        let err: ApiError = DbError::not_found("User", "7").into();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "User not found: 7");

        let err: ApiError = DbError::duplicate("name", "Ania").into();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.code.status(), StatusCode::CONFLICT);

        let err: ApiError = DbError::QueryFailed("syntax error near".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "Database operation failed");
    }

    #[test]
    fn test_ingest_error_mapping() {
        let err: ApiError = IngestError::Parse(ParseError::EmptyBody).into();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err: ApiError = IngestError::Database(DbError::PoolExhausted).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        let err: ApiError = IngestError::Io(std::io::Error::other("disk")).into();
        assert_eq!(err.code, ErrorCode::Internal);
    }

    #[test]
    fn test_serialized_shape() {
        let body = serde_json::to_value(ApiError::validation("bad")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"code": "VALIDATION_ERROR", "message": "bad"})
        );
    }
}
