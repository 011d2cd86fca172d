//! # Validation Module
//!
//! Record-level checks run on a parsed receipt right before persistence.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Extraction (header.rs, products.rs)                          │
//! │  └── Field defaults + ExtractionNote, never fails                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── receipt number present, totals not negative                       │
//! │  ├── currency is a 3-letter code                                       │
//! │  └── per line: name, tax letter, discount ≥ 0, after = before − disc.  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite CHECK / UNIQUE / FOREIGN KEY)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first violation wins; a failing receipt is rejected as a whole.

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::types::{ParsedProductLine, ParsedReceipt, ParsedReceiptHeader};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a whole parsed receipt.
///
/// ## Example
/// ```rust,ignore
/// let parsed = parse_receipt(&doc);
/// validate_receipt(&parsed)?;
/// ```
pub fn validate_receipt(receipt: &ParsedReceipt) -> ValidationResult<()> {
    validate_header(&receipt.header)?;
    for (line, product) in receipt.products.iter().enumerate() {
        validate_product_line(line, product)?;
    }
    Ok(())
}

// =============================================================================
// Header
// =============================================================================

pub fn validate_header(header: &ParsedReceiptHeader) -> ValidationResult<()> {
    if header.receipt_number.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "receipt_number".to_string(),
        });
    }

    if header.store.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "store_name".to_string(),
        });
    }

    validate_non_negative("final_price", header.final_price)?;
    validate_non_negative("total_discounts", header.total_discounts)?;
    validate_currency(&header.currency)
}

/// Validates an ISO 4217 style code: exactly three ASCII upper-case letters.
///
/// ## Example
/// ```rust
/// use paragon_core::validation::validate_currency;
///
/// assert!(validate_currency("PLN").is_ok());
/// assert!(validate_currency("zł").is_err());
/// ```
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: format!("'{}' is not a 3-letter currency code", code),
        })
    }
}

fn validate_non_negative(field: &str, value: Decimal) -> ValidationResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Product Lines
// =============================================================================

/// Validates one product line.
///
/// `line` is the zero-based print position, used only in the error.
pub fn validate_product_line(line: usize, product: &ParsedProductLine) -> ValidationResult<()> {
    if product.product_name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: format!("products[{}].product_name", line),
        });
    }

    let mut letters = product.tax_type.chars();
    match (letters.next(), letters.next()) {
        (Some(c), None) if c.is_alphabetic() => {}
        _ => {
            return Err(ValidationError::InvalidFormat {
                field: format!("products[{}].tax_type", line),
                reason: format!("'{}' is not a single letter", product.tax_type),
            })
        }
    }

    validate_non_negative("unit_discount", product.unit_discount)?;
    validate_non_negative("total_discount", product.total_discount)?;

    if product.total_after_discount != product.total_price_before - product.total_discount {
        return Err(ValidationError::Inconsistent {
            line,
            field: "total_after_discount".to_string(),
            reason: format!(
                "{} != {} - {}",
                product.total_after_discount, product.total_price_before, product.total_discount
            ),
        });
    }

    if product.unit_after_discount != product.unit_price_before - product.unit_discount {
        return Err(ValidationError::Inconsistent {
            line,
            field: "unit_after_discount".to_string(),
            reason: format!(
                "{} != {} - {}",
                product.unit_after_discount, product.unit_price_before, product.unit_discount
            ),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
