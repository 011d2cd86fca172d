//! # Line-Item Reconstructor
//!
//! Turns the ordered body events into product lines, pairing each sell line
//! with the discount printed right after it.
//!
//! ## Pending Slot
//! ```text
//!  body events            pending slot                 output
//!  ───────────            ────────────                 ──────
//!  sellLine  "Mleko A" ─► [Mleko, before 3.50]
//!  discountLine A/350  ─► [Mleko, discount 0.50]
//!  addLine             ─► (unchanged)
//!  sellLine  "Chleb B" ─► [Chleb, before 4.20]   ───►  Mleko 3.50 / 0.50 / 3.00
//!  sellLine  storno    ─► (skipped, slot untouched)
//!  <end of stream>                               ───►  Chleb 4.20 / 0.00 / 4.20
//! ```
//!
//! There is exactly one pending product at a time. A sell line finalizes the
//! previous one; the end of the stream finalizes the last one. A discount is
//! applied only when its VAT letter equals the pending tax type and its base
//! equals the pending total before discount. Anything else is left out of
//! the numbers and reported as [`ExtractionNote::DiscountNotApplied`].

use rust_decimal::Decimal;

use crate::document::{BodyEvent, DiscountLine, ReceiptDocument, SellLine};
use crate::money::{from_minor_units, normalize_decimal, quantize_money, quantize_quantity};
use crate::types::{ExtractionNote, ParsedProductLine};

/// Tax letter used when neither the name nor `vatId` carries one.
pub const DEFAULT_TAX_TYPE: &str = "A";

/// Extracts product lines in receipt print order.
pub fn extract_products(doc: &ReceiptDocument) -> Vec<ParsedProductLine> {
    extract_products_with_notes(doc).0
}

/// Extracts product lines and the diagnostics produced on the way.
pub fn extract_products_with_notes(
    doc: &ReceiptDocument,
) -> (Vec<ParsedProductLine>, Vec<ExtractionNote>) {
    let mut reconstructor = LineItemReconstructor::new();
    for event in doc.events() {
        reconstructor.push(event);
    }
    reconstructor.finish()
}

// =============================================================================
// Reconstructor
// =============================================================================

#[derive(Debug, Clone)]
struct PendingProduct {
    name: String,
    tax_type: String,
    quantity: Decimal,
    unit_price_before: Decimal,
    total_price_before: Decimal,
    total_discount: Decimal,
}

/// Streaming state machine over body events.
///
/// ## Example
/// ```rust,ignore
/// let mut items = LineItemReconstructor::new();
/// for event in doc.events() {
///     items.push(event);
/// }
/// let (products, notes) = items.finish();
/// ```
#[derive(Debug, Default)]
pub struct LineItemReconstructor {
    pending: Option<PendingProduct>,
    products: Vec<ParsedProductLine>,
    notes: Vec<ExtractionNote>,
}

impl LineItemReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one body event. Events other than sell and discount lines are
    /// ignored and do not disturb the pending slot.
    pub fn push(&mut self, event: &BodyEvent) {
        match event {
            BodyEvent::SellLine(line) if line.is_storno => {}
            BodyEvent::SellLine(line) => self.start_product(line),
            BodyEvent::DiscountLine(discount) => self.apply_discount(discount),
            _ => {}
        }
    }

    /// Finalizes the pending product and returns everything collected.
    pub fn finish(mut self) -> (Vec<ParsedProductLine>, Vec<ExtractionNote>) {
        self.flush();
        (self.products, self.notes)
    }

    fn start_product(&mut self, line: &SellLine) {
        self.flush();

        let (name, tax_type) = split_tax_type(&line.name, line.vat_id.as_deref());
        let tax_type = tax_type.unwrap_or_else(|| {
            self.notes.push(ExtractionNote::MissingTaxType {
                product_name: name.clone(),
            });
            DEFAULT_TAX_TYPE.to_string()
        });

        let quantity = quantize_quantity(normalize_decimal(line.quantity.as_ref(), Decimal::ONE));
        let unit_price_before = quantize_money(from_minor_units(line.price.as_ref()));

        // Missing total: unit × quantity, expressed in minor units so the
        // normalizer default stays on the same scale as the raw field.
        let computed_minor = unit_price_before * quantity * Decimal::ONE_HUNDRED;
        let total_price_before = quantize_money(
            normalize_decimal(line.total.as_ref(), computed_minor) / Decimal::ONE_HUNDRED,
        );

        self.pending = Some(PendingProduct {
            name,
            tax_type,
            quantity,
            unit_price_before,
            total_price_before,
            total_discount: Decimal::ZERO,
        });
    }

    fn apply_discount(&mut self, discount: &DiscountLine) {
        let vat_id = discount
            .vat_id
            .as_deref()
            .map(|v| v.trim().to_uppercase())
            .filter(|v| !v.is_empty());
        let base = quantize_money(from_minor_units(discount.base.as_ref()));
        let value = quantize_money(from_minor_units(discount.value.as_ref())).abs();

        match self.pending.as_mut() {
            Some(pending)
                if vat_id.as_deref() == Some(pending.tax_type.as_str())
                    && base == pending.total_price_before =>
            {
                pending.total_discount = value;
            }
            pending => {
                self.notes.push(ExtractionNote::DiscountNotApplied {
                    product_name: pending.map(|p| p.name.clone()),
                    vat_id,
                    base,
                    value,
                });
            }
        }
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.products.push(finalize(pending));
        }
    }
}

fn finalize(pending: PendingProduct) -> ParsedProductLine {
    let total_discount = quantize_money(pending.total_discount);
    let unit_discount = if pending.quantity > Decimal::ZERO {
        quantize_money(total_discount / pending.quantity)
    } else {
        quantize_money(Decimal::ZERO)
    };

    ParsedProductLine {
        product_name: pending.name,
        tax_type: pending.tax_type,
        quantity: pending.quantity,
        unit_price_before: pending.unit_price_before,
        total_price_before: pending.total_price_before,
        unit_discount,
        total_discount,
        unit_after_discount: quantize_money(pending.unit_price_before - unit_discount),
        total_after_discount: quantize_money(pending.total_price_before - total_discount),
    }
}

/// Splits `"Mleko 3.2% A"` into `("Mleko 3.2%", Some("A"))`.
///
/// The trailing token counts as the tax letter only when it is a single
/// alphabetic character. Otherwise the whole name is kept and the letter
/// comes from the first character of `vatId`.
fn split_tax_type(raw_name: &str, vat_id: Option<&str>) -> (String, Option<String>) {
    let name = raw_name.trim();

    if let Some((head, tail)) = name.rsplit_once(char::is_whitespace) {
        let mut chars = tail.chars();
        if let (Some(letter), None) = (chars.next(), chars.next()) {
            if letter.is_alphabetic() && !head.trim().is_empty() {
                return (head.trim_end().to_string(), Some(letter.to_uppercase().collect()));
            }
        }
    }

    let from_vat = vat_id
        .and_then(|v| v.trim().chars().next())
        .map(|c| c.to_uppercase().collect());
    (name.to_string(), from_vat)
}

// =============================================================================
// Unit Tests
// =============================================================================
