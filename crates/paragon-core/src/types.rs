//! # Domain Types
//!
//! Parsed (transient) and persisted (durable) receipt records.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  TRANSIENT (produced by parsing, lives in memory)                       │
//! │  ┌─────────────────────┐   ┌─────────────────────┐                     │
//! │  │ ParsedReceiptHeader │   │ ParsedProductLine   │ × N (print order)   │
//! │  │  receipt_number     │   │  product_name       │                     │
//! │  │  date / time        │   │  tax_type, quantity │                     │
//! │  │  StoreInfo          │   │  before / discount  │                     │
//! │  │  final_price        │   │  / after prices     │                     │
//! │  └─────────┬───────────┘   └──────────┬──────────┘                     │
//! │            └──────────┬───────────────┘                                │
//! │                       ▼                                                 │
//! │              ParsedReceipt { header, products, notes }                 │
//! │                       │  persist (one transaction)                     │
//! │                       ▼                                                 │
//! │  DURABLE (rows)                                                         │
//! │  ┌──────────┐   ┌──────────┐   ┌────────────────┐   ┌──────────┐      │
//! │  │  Store   │◄──│ Receipt  │◄──│ ReceiptProduct │   │   User   │      │
//! │  │ (name,   │   │ (store,  │   │  cents / milli │   │ (member  │      │
//! │  │  address,│   │  number, │   └────────────────┘   │  or      │      │
//! │  │  postal) │   │  date,   │                        │  Other)  │      │
//! │  └──────────┘   │  time)   │                        └──────────┘      │
//! │                 └──────────┘                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Parsed types carry `Decimal`; persisted types carry integer cents and
//! integer thousandths, the same convention as [`Money`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::{quantity_from_milli, Money};

// =============================================================================
// Store
// =============================================================================

/// Store identity and location recovered from a receipt.
///
/// Identity is the triple `(name, address, postal_code)`; `city` is mutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
}

// =============================================================================
// Parsed Receipt
// =============================================================================

/// Where the receipt number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptNumberSource {
    /// `fiscalFooter.billNumber` (or the top-level `fiscal` override).
    FiscalFooter,
    /// `headerData.docNumber`.
    HeaderDocNumber,
    /// `Nr transakcji: <span>…</span>` inside an `addLine`.
    TransactionLine,
    /// Top-level `receiptNumber`.
    Document,
    /// Unix timestamp generated at parse time.
    Generated,
}

/// Receipt-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceiptHeader {
    /// Never empty.
    pub receipt_number: String,
    pub receipt_number_source: ReceiptNumberSource,
    pub date: NaiveDate,
    /// Second precision.
    pub time: NaiveTime,
    pub store: StoreInfo,
    /// Seller tax id (`headerData.tin`), when printed.
    pub tax_id: Option<String>,
    /// 2 dp, defaults to 0.00.
    pub final_price: Decimal,
    /// 2 dp, defaults to 0.00.
    pub total_discounts: Decimal,
    /// ISO 4217 code, defaults to PLN.
    pub currency: String,
    pub payment_name: Option<String>,
}

/// One purchased line.
///
/// Monetary fields have exactly 2 fractional digits, quantity exactly 3.
/// `*_after_discount == *_before - *_discount` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedProductLine {
    pub product_name: String,
    pub tax_type: String,
    pub quantity: Decimal,
    pub unit_price_before: Decimal,
    pub total_price_before: Decimal,
    pub unit_discount: Decimal,
    pub total_discount: Decimal,
    pub unit_after_discount: Decimal,
    pub total_after_discount: Decimal,
}

/// A recoverable defect found while parsing.
///
/// None of these abort the file. They are surfaced so the caller can log
/// them with its own context (file name, upload id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionNote {
    /// No receipt number anywhere; a timestamp was used.
    GeneratedReceiptNumber { receipt_number: String },
    /// Store name could not be recovered.
    UnknownStore,
    /// Store fields were taken from a structured `store` record.
    StoreFromRecord,
    /// No usable timestamp; the parse time was used.
    MissingTimestamp,
    /// A timestamp was present but could not be parsed.
    UnparsableTimestamp { raw: String },
    /// Currency code was not three letters; the default was used.
    InvalidCurrency { raw: String },
    /// A sell line had no tax letter and no `vatId`.
    MissingTaxType { product_name: String },
    /// A discount line did not match the sell line above it.
    DiscountNotApplied {
        product_name: Option<String>,
        vat_id: Option<String>,
        base: Decimal,
        value: Decimal,
    },
}

impl fmt::Display for ExtractionNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionNote::GeneratedReceiptNumber { receipt_number } => {
                write!(f, "no receipt number found, generated {}", receipt_number)
            }
            ExtractionNote::UnknownStore => write!(f, "store name not found"),
            ExtractionNote::StoreFromRecord => write!(f, "store taken from structured record"),
            ExtractionNote::MissingTimestamp => write!(f, "no receipt timestamp found"),
            ExtractionNote::UnparsableTimestamp { raw } => {
                write!(f, "unparsable receipt timestamp '{}'", raw)
            }
            ExtractionNote::InvalidCurrency { raw } => write!(f, "invalid currency '{}'", raw),
            ExtractionNote::MissingTaxType { product_name } => {
                write!(f, "no tax type for '{}'", product_name)
            }
            ExtractionNote::DiscountNotApplied {
                product_name,
                vat_id,
                base,
                value,
            } => write!(
                f,
                "discount {} (base {}, vat {}) not applied to {}",
                value,
                base,
                vat_id.as_deref().unwrap_or("-"),
                product_name.as_deref().unwrap_or("<no preceding item>")
            ),
        }
    }
}

/// Result of parsing one receipt document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub header: ParsedReceiptHeader,
    /// Receipt print order; downstream editing addresses lines by index.
    pub products: Vec<ParsedProductLine>,
    pub notes: Vec<ExtractionNote>,
}

// =============================================================================
// Persisted Records
// =============================================================================

/// A store row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    pub store_id: i64,
    pub store_name: String,
    pub store_city: String,
    pub store_address: String,
    pub postal_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A receipt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Receipt {
    pub receipt_id: i64,
    pub store_id: i64,
    pub receipt_number: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub final_price_cents: i64,
    pub total_discounts_cents: i64,
    pub currency: String,
    /// Literal label from the receipt; may have no member mapping yet.
    pub payment_name: Option<String>,
    pub counted: bool,
    pub settled: bool,
    /// Paid by the "Other" member: not a household expense.
    pub not_our_receipt: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Receipt {
    #[inline]
    pub fn final_price(&self) -> Money {
        Money::from_cents(self.final_price_cents)
    }

    #[inline]
    pub fn total_discounts(&self) -> Money {
        Money::from_cents(self.total_discounts_cents)
    }
}

/// A product row belonging to a receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReceiptProduct {
    pub product_id: i64,
    pub receipt_id: i64,
    /// Zero-based position on the printed receipt.
    pub line_no: i64,
    pub product_name: String,
    pub quantity_milli: i64,
    pub tax_type: String,
    pub unit_price_before_cents: i64,
    pub total_price_before_cents: i64,
    pub unit_discount_cents: i64,
    pub total_discount_cents: i64,
    pub unit_after_discount_cents: i64,
    pub total_after_discount_cents: i64,
}

impl ReceiptProduct {
    /// Quantity with exactly 3 fractional digits.
    pub fn quantity(&self) -> Decimal {
        quantity_from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn total_price_before(&self) -> Money {
        Money::from_cents(self.total_price_before_cents)
    }

    #[inline]
    pub fn total_discount(&self) -> Money {
        Money::from_cents(self.total_discount_cents)
    }

    #[inline]
    pub fn total_after_discount(&self) -> Money {
        Money::from_cents(self.total_after_discount_cents)
    }
}

/// A household member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub user_id: i64,
    pub name: String,
    /// The sentinel member for receipts that are not ours.
    pub is_other: bool,
}

/// A payment label seen on receipts with no member mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UnassignedPayment {
    pub payment_name: String,
    pub receipt_count: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
