//! # Money Module
//!
//! Value normalization and fixed-precision rounding for receipt amounts.
//!
//! ## Why Decimal, Then Integer Cents?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RAW JSON SCALARS                                                       │
//! │                                                                         │
//! │    4250        "1,5"        "12.345678"      null       true            │
//! │      │           │              │              │          │             │
//! │      ▼           ▼              ▼              ▼          ▼             │
//! │  normalize_decimal(raw, default)  ── never fails, falls back to default │
//! │      │                                                                  │
//! │      ├── money:    / 100 (minor units)  → quantize_money    (2 dp)     │
//! │      └── quantity:                      → quantize_quantity (3 dp)     │
//! │                                                                         │
//! │  Storage: Money(i64 cents), quantity as i64 thousandths                 │
//! │  Both quantizers round half-up (midpoint away from zero), so           │
//! │  decimal → integer → decimal is the identity on quantized values.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use paragon_core::money::{from_minor_units, normalize_decimal, quantize_quantity, Money};
//! use rust_decimal::Decimal;
//! use serde_json::json;
//!
//! let total = from_minor_units(Some(&json!(4250)));
//! assert_eq!(total, Decimal::new(4250, 2));
//!
//! let qty = quantize_quantity(normalize_decimal(Some(&json!("12.345678")), Decimal::ONE));
//! assert_eq!(qty.to_string(), "12.346");
//!
//! let price = Money::from_decimal(total).unwrap();
//! assert_eq!(price.cents(), 4250);
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Fractional digits kept for monetary amounts.
pub const MONEY_DP: u32 = 2;

/// Fractional digits kept for quantities.
pub const QUANTITY_DP: u32 = 3;

// =============================================================================
// Value Normalizer
// =============================================================================

/// Converts a raw JSON scalar into a `Decimal`.
///
/// ## Accepted Inputs
/// - JSON numbers (integers and floats)
/// - Numeric strings using `.` or `,` as decimal separator; spaces and
///   non-breaking spaces used as digit grouping are ignored
/// - Scientific notation (`"1e3"`)
///
/// Everything else (null, missing, booleans, objects, garbage strings)
/// returns `default`. This function never fails.
///
/// ## Arguments
/// * `raw` - The JSON value, `None` when the field is absent
/// * `default` - Returned on any conversion failure
pub fn normalize_decimal(raw: Option<&Value>, default: Decimal) -> Decimal {
    match raw {
        Some(Value::Number(n)) => parse_decimal_str(&n.to_string()).unwrap_or(default),
        Some(Value::String(s)) => parse_decimal_str(s).unwrap_or(default),
        _ => default,
    }
}

/// Parses a locale-tolerant numeric string.
///
/// Returns `None` when the string does not hold a number.
pub fn parse_decimal_str(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Normalizes an amount given in minor currency units and divides it by 100.
///
/// A missing or unparsable value is treated as zero.
pub fn from_minor_units(raw: Option<&Value>) -> Decimal {
    normalize_decimal(raw, Decimal::ZERO) / Decimal::ONE_HUNDRED
}

// =============================================================================
// Quantizers
// =============================================================================

/// Rounds half-up to `dp` digits and pads so the scale is exactly `dp`.
fn quantize(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// Quantizes a monetary amount to exactly 2 fractional digits, half-up.
///
/// ## Example
/// ```rust
/// use paragon_core::money::quantize_money;
/// use rust_decimal::Decimal;
///
/// assert_eq!(quantize_money(Decimal::new(1005, 3)).to_string(), "1.01");
/// assert_eq!(quantize_money(Decimal::new(35, 1)).to_string(), "3.50");
/// ```
pub fn quantize_money(value: Decimal) -> Decimal {
    quantize(value, MONEY_DP)
}

/// Quantizes a quantity to exactly 3 fractional digits, half-up.
pub fn quantize_quantity(value: Decimal) -> Decimal {
    quantize(value, QUANTITY_DP)
}

/// Converts a quantity to integer thousandths for storage.
pub fn quantity_to_milli(value: Decimal) -> CoreResult<i64> {
    scaled_integer(value, QUANTITY_DP, "quantity")
}

/// Converts stored thousandths back to a 3-digit quantity.
pub fn quantity_from_milli(milli: i64) -> Decimal {
    Decimal::new(milli, QUANTITY_DP)
}

fn scaled_integer(value: Decimal, dp: u32, field: &str) -> CoreResult<i64> {
    let quantized = quantize(value, dp);
    i64::try_from(quantized.mantissa()).map_err(|_| CoreError::AmountOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
    })
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in the smallest currency unit (grosz for PLN).
///
/// This is the storage form. Parsing works in `Decimal`; the conversion
/// quantizes half-up, so `Money::from_decimal(x).to_decimal()` equals
/// `quantize_money(x)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates money from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Zero money.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Converts a decimal amount, rounding half-up to whole cents.
    pub fn from_decimal(value: Decimal) -> CoreResult<Self> {
        scaled_integer(value, MONEY_DP, "amount").map(Money)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the amount as a 2-digit decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MONEY_DP)
    }

    /// Returns true if the amount is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
