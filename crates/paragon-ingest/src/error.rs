//! # Ingest Error Types
//!
//! Error types for the ingestion pipeline.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ingest Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Document     │  │      Storage            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Parse          │  │  Database               │ │
//! │  │  ConfigLoad     │  │  Validation     │  │  Io (read / rename)     │ │
//! │  │  ConfigSave     │  │  Json, Amount   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Every variant aborts one file only. The batch driver logs it, routes  │
//! │  the file to rejected/ and moves on.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Skips (duplicate, ignored label, declined prompt) are not errors; they are
//! [`IngestOutcome::Skipped`](crate::pipeline::IngestOutcome::Skipped).

use std::path::PathBuf;

use paragon_core::{CoreError, ParseError, ValidationError};
use paragon_db::DbError;
use thiserror::Error;

/// Result type alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Everything that can make a single receipt fail.
#[derive(Debug, Error)]
pub enum IngestError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read or decoded.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Config file could not be written.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Document Errors
    // =========================================================================
    /// Receipt document is structurally broken.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Parsed receipt breaks a record invariant.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Upload payload is not JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An amount does not fit integer storage.
    #[error("Amount out of range: {0}")]
    Amount(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Persistence or lookup failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Reading a receipt file or talking to the operator failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be moved out of the inbox.
    #[error("Failed to move {path}: {source}")]
    MoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<CoreError> for IngestError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Parse(e) => IngestError::Parse(e),
            CoreError::Validation(e) => IngestError::Validation(e),
            other => IngestError::Amount(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(err: toml::de::Error) -> Self {
        IngestError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for IngestError {
    fn from(err: toml::ser::Error) -> Self {
        IngestError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl IngestError {
    /// Returns true if the receipt itself is at fault, as opposed to the
    /// machine it is processed on. The HTTP layer answers these with 4xx.
    pub fn is_document_error(&self) -> bool {
        match self {
            IngestError::Parse(_)
            | IngestError::Validation(_)
            | IngestError::Json(_)
            | IngestError::Amount(_) => true,
            IngestError::Database(db) => matches!(
                db,
                DbError::ConstraintViolation { .. } | DbError::InvalidValue(_)
            ),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidConfig(_)
                | IngestError::ConfigLoadFailed(_)
                | IngestError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_is_flattened() {
        let err: IngestError = CoreError::Parse(ParseError::EmptyBody).into();
        assert!(matches!(err, IngestError::Parse(ParseError::EmptyBody)));

        let err: IngestError = CoreError::Validation(ValidationError::Required {
            field: "store_name".into(),
        })
        .into();
        assert!(matches!(err, IngestError::Validation(_)));

        let err: IngestError = CoreError::AmountOutOfRange {
            field: "final_price".into(),
            value: "1e30".into(),
        }
        .into();
        assert!(matches!(err, IngestError::Amount(_)));
    }

    #[test]
    fn test_document_errors() {
        assert!(IngestError::Parse(ParseError::NotAnObject).is_document_error());
        assert!(IngestError::Database(DbError::InvalidValue("x".into())).is_document_error());
        assert!(!IngestError::Database(DbError::PoolExhausted).is_document_error());
        assert!(!IngestError::Io(std::io::Error::other("disk")).is_document_error());
    }

    #[test]
    fn test_config_errors() {
        assert!(IngestError::InvalidConfig("port".into()).is_config_error());
        assert!(!IngestError::Parse(ParseError::EmptyBody).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::MoveFailed {
            path: PathBuf::from("data/to_check/a.json"),
            source: std::io::Error::other("busy"),
        };
        assert_eq!(err.to_string(), "Failed to move data/to_check/a.json: busy");
    }
}
