//! # Error Types
//!
//! Domain-specific error types for paragon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  paragon-core errors (this file)                                       │
//! │  ├── ParseError       - Document is structurally broken                │
//! │  ├── ValidationError  - Parsed receipt breaks a record invariant       │
//! │  └── CoreError        - Umbrella for both plus range failures          │
//! │                                                                         │
//! │  paragon-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  paragon-ingest errors                                                 │
//! │  └── IngestError      - What the batch driver / HTTP layer sees        │
//! │                                                                         │
//! │  Flow: ParseError → CoreError → IngestError → ApiError / CLI line      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Missing or malformed *fields* are never errors here. They fall back to a
//! default and leave an [`ExtractionNote`](crate::types::ExtractionNote) on
//! the parsed receipt. Only a document that cannot be read at all produces a
//! [`ParseError`].

use thiserror::Error;

// =============================================================================
// Parse Error
// =============================================================================

/// A receipt document that cannot be decoded into events.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The top-level JSON value is not an object.
    #[error("Receipt document must be a JSON object")]
    NotAnObject,

    /// A required top-level section is missing or is not an array.
    #[error("Receipt document has no '{0}' array")]
    MissingSection(&'static str),

    /// The body array is present but holds no events.
    #[error("Receipt body contains no events")]
    EmptyBody,

    /// A recognized event has a shape that cannot be decoded.
    ///
    /// ## When This Occurs
    /// - `sellLine` carries a string or number instead of an object
    ///
    /// Mistyped fields inside an event object are not errors; they read as
    /// the field default.
    #[error("Malformed '{kind}' event at position {index}: {reason}")]
    MalformedEvent {
        index: usize,
        kind: String,
        reason: String,
    },
}

// =============================================================================
// Validation Error
// =============================================================================

/// A parsed receipt that violates a record invariant.
///
/// Checked right before persistence so a bad record is rejected as a whole
/// instead of being half written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// An amount that must be zero or positive is negative.
    #[error("{field} must not be negative (got {value})")]
    Negative { field: String, value: String },

    /// Field does not have the expected shape.
    #[error("Invalid format for {field}: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Derived fields disagree with each other.
    #[error("Inconsistent {field} on line {line}: {reason}")]
    Inconsistent {
        line: usize,
        field: String,
        reason: String,
    },
}

// =============================================================================
// Core Error
// =============================================================================

/// Umbrella error for everything paragon-core can report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Parsed receipt failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A decimal does not fit the integer storage representation.
    #[error("{field} is out of range: {value}")]
    AmountOutOfRange { field: String, value: String },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
