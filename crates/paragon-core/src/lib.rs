//! # paragon-core: Receipt Parsing for Paragon
//!
//! Turns a fiscal-receipt JSON export into a validated, decimal-precise
//! receipt record. Pure functions, no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Paragon Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        apps/paragon  (CLI batch, prompt, HTTP upload)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        paragon-ingest (pipeline, payer, file lifecycle)         │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │  ┌──────────────▼───────────────────┐  ┌───────▼───────────────────┐   │
//! │  │   ★ paragon-core (THIS CRATE) ★  │  │   paragon-db              │   │
//! │  │                                  │  │   SQLite, repositories,   │   │
//! │  │  document ─► header   ─┐         │  │   persist transaction     │   │
//! │  │          └─► products ─┼─► ParsedReceipt ─► validation         │   │
//! │  │  money (normalize, quantize)     │  └───────────────────────────┘   │
//! │  │  NO I/O • NO DATABASE            │                                  │
//! │  └──────────────────────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`document`] - Typed event model of the JSON export
//! - [`money`] - Value normalizer, quantizers, integer-cent `Money`
//! - [`header`] - Receipt number, store, date/time, totals, payment label
//! - [`products`] - Sell/discount pairing into product lines
//! - [`validation`] - Record checks before persistence
//! - [`types`] - Parsed and persisted records
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use paragon_core::{parse_receipt, ReceiptDocument};
//! use serde_json::json;
//!
//! let doc = ReceiptDocument::from_value(&json!({
//!     "body": [
//!         {"sellLine": {"name": "Mleko 3.2% A", "price": 350, "quantity": "1"}},
//!         {"discountLine": {"value": 50, "vatId": "A", "base": 350}},
//!         {"sumInCurrency": {"fiscalTotal": 300, "currency": "PLN"}},
//!         {"fiscalFooter": {"billNumber": "17", "date": "2024-05-01T10:00:00Z"}}
//!     ]
//! }))
//! .unwrap();
//!
//! let receipt = parse_receipt(&doc);
//! assert_eq!(receipt.header.receipt_number, "17");
//! assert_eq!(receipt.products[0].total_after_discount.to_string(), "3.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod header;
pub mod money;
pub mod products;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use document::ReceiptDocument;
pub use error::{CoreError, CoreResult, ParseError, ValidationError};
pub use header::{extract_header, extract_header_at};
pub use money::Money;
pub use products::extract_products;
pub use types::*;

use chrono::{DateTime, Utc};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Store name used when no source yields one.
pub const UNKNOWN_STORE: &str = "Unknown Store";

/// Currency assumed when the receipt does not state a valid one.
pub const DEFAULT_CURRENCY: &str = "PLN";

/// Name of the sentinel household member for receipts that are not ours.
pub const OTHER_MEMBER_NAME: &str = "Other";

// =============================================================================
// Parsing Entry Point
// =============================================================================

/// Parses a decoded document into a receipt record.
///
/// Never fails: structural problems are caught by [`ReceiptDocument`]
/// decoding, field problems become [`ExtractionNote`]s.
pub fn parse_receipt(doc: &ReceiptDocument) -> ParsedReceipt {
    parse_receipt_at(doc, Utc::now())
}

/// Same as [`parse_receipt`] with an explicit clock for fallbacks.
pub fn parse_receipt_at(doc: &ReceiptDocument, now: DateTime<Utc>) -> ParsedReceipt {
    let (header, mut notes) = header::extract_header_at(doc, now);
    let (products, product_notes) = products::extract_products_with_notes(doc);
    notes.extend(product_notes);

    ParsedReceipt {
        header,
        products,
        notes,
    }
}
