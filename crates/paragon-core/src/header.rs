//! # Header/Store Extractor
//!
//! Recovers receipt-level fields from the header block, the fiscal footer
//! and the summary events.
//!
//! ## Field Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Field            Source (first hit wins)                               │
//! │  ───────────────  ───────────────────────────────────────────────────── │
//! │  receipt_number   fiscal.billNumber → fiscalFooter.billNumber →         │
//! │                   headerData.docNumber → addLine "Nr transakcji" →      │
//! │                   receiptNumber → unix timestamp (note)                 │
//! │  store            headerText lines → store record → "Unknown Store"     │
//! │  date / time      fiscal.date → fiscalFooter.date → headerData.date →   │
//! │                   parse time (note)                                     │
//! │  final_price      sumInCurrency.fiscalTotal / 100      (last wins)      │
//! │  currency         sumInCurrency.currency, default PLN                   │
//! │  total_discounts  discountSummary.discounts / 100      (last wins)      │
//! │  payment_name     first body payment.name → top-level payment.name      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Header Text
//! ```text
//! <div class="align-center ">BIEDRONKA "CODZIENNIE NISKIE CENY" 7565</div>
//! <div class="align-center ">60-649 POZNAŃ UL. PIĄTKOWSKA 78C</div>
//!
//!   line 0 → name    = BIEDRONKA            (cut at '"', trailing digits off)
//!   line 1 → postal  = 60-649
//!            city    = POZNAŃ               (first token after postal code)
//!            address = UL. PIĄTKOWSKA 78C   (the rest)
//! ```
//!
//! No field is fatal. Every fallback leaves an [`ExtractionNote`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::document::{
    scalar_to_string, BodyEvent, HeaderEntry, ReceiptDocument, StoreRecord,
};
use crate::money::{from_minor_units, quantize_money};
use crate::types::{ExtractionNote, ParsedReceiptHeader, ReceiptNumberSource, StoreInfo};
use crate::{DEFAULT_CURRENCY, UNKNOWN_STORE};

// =============================================================================
// Patterns
// =============================================================================

fn postal_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{2}-\d{3})\b").expect("invalid postal code regex"))
}

fn transaction_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Nr transakcji:\s*<span[^>]*>(\d+)<").expect("invalid transaction regex")
    })
}

fn trailing_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\d+$").expect("invalid trailing digits regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

fn line_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.align-center").expect("invalid line selector"))
}

// =============================================================================
// Entry Points
// =============================================================================

/// Extracts the receipt header using the current time for fallbacks.
///
/// Diagnostics are dropped; use [`extract_header_at`] to keep them.
pub fn extract_header(doc: &ReceiptDocument) -> ParsedReceiptHeader {
    extract_header_at(doc, Utc::now()).0
}

/// Extracts the receipt header with an explicit clock.
///
/// ## Arguments
/// * `doc` - Decoded receipt document
/// * `now` - Used for the generated receipt number and missing timestamps
///
/// ## Returns
/// The header plus every fallback that was taken, in the order taken.
pub fn extract_header_at(
    doc: &ReceiptDocument,
    now: DateTime<Utc>,
) -> (ParsedReceiptHeader, Vec<ExtractionNote>) {
    let mut notes = Vec::new();

    let (receipt_number, receipt_number_source) = resolve_receipt_number(doc, now, &mut notes);
    let store = extract_store(doc, &mut notes);
    let timestamp = resolve_timestamp(doc, now, &mut notes);
    let totals = extract_totals(doc, &mut notes);

    let header = ParsedReceiptHeader {
        receipt_number,
        receipt_number_source,
        date: timestamp.date(),
        time: truncate_to_seconds(timestamp.time()),
        store,
        tax_id: header_data(doc).find_map(|data| scalar_to_string(data.tin.as_ref())),
        final_price: totals.final_price,
        total_discounts: totals.total_discounts,
        currency: totals.currency,
        payment_name: resolve_payment_name(doc),
    };

    (header, notes)
}

// =============================================================================
// Receipt Number
// =============================================================================

fn resolve_receipt_number(
    doc: &ReceiptDocument,
    now: DateTime<Utc>,
    notes: &mut Vec<ExtractionNote>,
) -> (String, ReceiptNumberSource) {
    let from_footer = doc
        .fiscal
        .iter()
        .chain(fiscal_footers(doc))
        .find_map(|footer| scalar_to_string(footer.bill_number.as_ref()));
    if let Some(number) = from_footer {
        return (number, ReceiptNumberSource::FiscalFooter);
    }

    if let Some(number) = header_data(doc).find_map(|data| scalar_to_string(data.doc_number.as_ref()))
    {
        return (number, ReceiptNumberSource::HeaderDocNumber);
    }

    let from_line = doc.events().find_map(|event| match event {
        BodyEvent::AddLine(line) => line
            .data
            .as_deref()
            .and_then(|data| transaction_number_re().captures(data))
            .map(|caps| caps[1].to_string()),
        _ => None,
    });
    if let Some(number) = from_line {
        return (number, ReceiptNumberSource::TransactionLine);
    }

    if let Some(number) = scalar_to_string(doc.receipt_number.as_ref()) {
        return (number, ReceiptNumberSource::Document);
    }

    let generated = now.timestamp().to_string();
    notes.push(ExtractionNote::GeneratedReceiptNumber {
        receipt_number: generated.clone(),
    });
    (generated, ReceiptNumberSource::Generated)
}

// =============================================================================
// Store
// =============================================================================

fn extract_store(doc: &ReceiptDocument, notes: &mut Vec<ExtractionNote>) -> StoreInfo {
    let mut store = StoreInfo::default();

    let lines = doc
        .header
        .iter()
        .filter_map(|entry| match entry {
            HeaderEntry::Text(text) => text.header_text_lines.as_deref(),
            _ => None,
        })
        .map(header_lines)
        .find(|lines| !lines.is_empty())
        .unwrap_or_default();

    if let Some(first) = lines.first() {
        store.name = first.split('"').next().unwrap_or_default().trim().to_string();
    }

    if let Some(address_line) = lines.iter().skip(1).find(|l| postal_code_re().is_match(l)) {
        let (postal_code, city, address) = split_address_line(address_line);
        store.postal_code = postal_code;
        store.city = city;
        store.address = address;
    }

    if store.name.is_empty() || store.address.is_empty() {
        let records = doc.store.iter().chain(doc.events().filter_map(|event| match event {
            BodyEvent::Store(record) => Some(record),
            _ => None,
        }));

        let mut used_record = false;
        for record in records {
            used_record |= fill_from_record(&mut store, record);
        }
        if used_record {
            notes.push(ExtractionNote::StoreFromRecord);
        }
    }

    store.name = trailing_digits_re()
        .replace(&store.name, "")
        .trim()
        .to_string();

    if store.name.is_empty() {
        store.name = UNKNOWN_STORE.to_string();
        notes.push(ExtractionNote::UnknownStore);
    }

    store
}

/// Splits the embedded HTML fragment into trimmed, non-empty text lines.
fn header_lines(fragment: &str) -> Vec<String> {
    let html = Html::parse_fragment(fragment);

    let lines: Vec<String> = html
        .select(line_selector())
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|line| !line.is_empty())
        .collect();

    if !lines.is_empty() {
        return lines;
    }

    // Plain-text header: one line per newline.
    html.root_element()
        .text()
        .collect::<String>()
        .lines()
        .map(clean_text)
        .filter(|line| !line.is_empty())
        .collect()
}

fn clean_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}

/// `"60-649 POZNAŃ UL. PIĄTKOWSKA 78C"` → `("60-649", "POZNAŃ", "UL. PIĄTKOWSKA 78C")`.
fn split_address_line(line: &str) -> (String, String, String) {
    let mut rest = line.replace('\u{a0}', " ");

    let postal_code = postal_code_re()
        .captures(&rest)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();
    if !postal_code.is_empty() {
        rest = rest.replacen(&postal_code, "", 1);
    }

    let normalized = ws_re().replace_all(rest.trim(), " ").into_owned();
    match normalized.split_once(' ') {
        Some((city, address)) => (postal_code, city.to_string(), address.trim().to_string()),
        None => (postal_code, normalized, String::new()),
    }
}

/// Fills empty store fields from a structured record. Returns true if any
/// field was taken from it.
fn fill_from_record(store: &mut StoreInfo, record: &StoreRecord) -> bool {
    let mut used = false;

    if store.name.is_empty() {
        if let Some(name) = non_empty(record.name.as_deref()) {
            store.name = name.to_string();
            used = true;
        }
    }

    if store.city.is_empty() {
        if let Some(city) = non_empty(record.city.as_deref()) {
            store.city = city.to_uppercase();
            used = true;
        }
    }

    if store.address.is_empty() {
        if let Some(address) = non_empty(record.address.as_deref()) {
            let mut address = address.to_string();
            if store.postal_code.is_empty() {
                if let Some(m) = postal_code_re().find(&address) {
                    store.postal_code = m.as_str().to_string();
                    address = address.replacen(m.as_str(), "", 1);
                }
            }
            store.address = ws_re()
                .replace_all(address.trim_matches(|c: char| c == ',' || c.is_whitespace()), " ")
                .into_owned();
            used = true;
        }
    }

    used
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Date / Time
// =============================================================================

fn resolve_timestamp(
    doc: &ReceiptDocument,
    now: DateTime<Utc>,
    notes: &mut Vec<ExtractionNote>,
) -> NaiveDateTime {
    let candidates = doc
        .fiscal
        .iter()
        .chain(fiscal_footers(doc))
        .filter_map(|footer| footer.date.as_deref())
        .chain(header_data(doc).filter_map(|data| data.date.as_deref()))
        .map(str::trim)
        .filter(|raw| !raw.is_empty());

    let mut seen_any = false;
    for raw in candidates {
        seen_any = true;
        match parse_timestamp(raw) {
            Some(parsed) => return parsed,
            None => notes.push(ExtractionNote::UnparsableTimestamp {
                raw: raw.to_string(),
            }),
        }
    }

    if !seen_any {
        notes.push(ExtractionNote::MissingTimestamp);
    }
    now.naive_utc()
}

/// Parses an ISO-8601 timestamp. A trailing `Z` means UTC; an explicit
/// offset keeps the printed wall-clock time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn truncate_to_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

// =============================================================================
// Totals, Currency, Payment
// =============================================================================

struct Totals {
    final_price: Decimal,
    total_discounts: Decimal,
    currency: String,
}

fn extract_totals(doc: &ReceiptDocument, notes: &mut Vec<ExtractionNote>) -> Totals {
    let mut final_price = Decimal::ZERO;
    let mut total_discounts = Decimal::ZERO;
    let mut raw_currency: Option<&str> = None;

    for event in doc.events() {
        match event {
            BodyEvent::SumInCurrency(sum) => {
                final_price = from_minor_units(sum.fiscal_total.as_ref());
                raw_currency = sum.currency.as_deref();
            }
            BodyEvent::DiscountSummary(summary) => {
                if let Some(discounts) = summary.discounts.as_ref().filter(|v| !v.is_null()) {
                    total_discounts = from_minor_units(Some(discounts));
                }
            }
            _ => {}
        }
    }

    let currency = match raw_currency.map(str::trim).filter(|c| !c.is_empty()) {
        None => DEFAULT_CURRENCY.to_string(),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            code.to_ascii_uppercase()
        }
        Some(code) => {
            notes.push(ExtractionNote::InvalidCurrency {
                raw: code.to_string(),
            });
            DEFAULT_CURRENCY.to_string()
        }
    };

    Totals {
        final_price: quantize_money(final_price),
        total_discounts: quantize_money(total_discounts),
        currency,
    }
}

fn resolve_payment_name(doc: &ReceiptDocument) -> Option<String> {
    doc.events()
        .filter_map(|event| match event {
            BodyEvent::Payment(payment) => payment.name.as_deref(),
            _ => None,
        })
        .chain(doc.payment.iter().filter_map(|p| p.name.as_deref()))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Iteration Helpers
// =============================================================================

fn fiscal_footers(doc: &ReceiptDocument) -> impl Iterator<Item = &crate::document::FiscalFooter> {
    doc.events().filter_map(|event| match event {
        BodyEvent::FiscalFooter(footer) => Some(footer),
        _ => None,
    })
}

fn header_data(doc: &ReceiptDocument) -> impl Iterator<Item = &crate::document::HeaderData> {
    doc.header.iter().filter_map(|entry| match entry {
        HeaderEntry::Data(data) => Some(data),
        _ => None,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
