//! # Receipt Document Model
//!
//! Typed view of the fiscal-receipt JSON export.
//!
//! ## Wire Shape
//! ```text
//! {
//!   "header": [ {"headerText": {...}}, {"headerData": {...}} ],
//!   "body":   [ {"sellLine": {...}}, {"discountLine": {...}},
//!               {"sumInCurrency": {...}}, {"payment": {...}},
//!               {"fiscalFooter": {...}}, {"addLine": {...}}, ... ],
//!   "fiscal":  {...},   // optional override for footer fields
//!   "payment": {...},   // optional fallback for the payment label
//!   "store":   {...}    // optional structured store record
//! }
//! ```
//!
//! Every array element is a single-key object whose key names the event.
//! Decoding is explicit: known keys become a typed variant, unknown keys
//! become [`BodyEvent::Unknown`] / [`HeaderEntry::Unknown`] and are ignored
//! downstream. Numeric fields stay raw [`Value`]s because the export mixes
//! integers, floats and strings; the money module normalizes them on use.
//! Text and flag fields never fail: a number where text is expected is
//! printed, and null or any other wrong type reads as the field default.
//! Only a payload that is not an object at all is a malformed event.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::ParseError;

// =============================================================================
// Event Payloads
// =============================================================================

/// Free-form header text; `headerTextLines` is an HTML fragment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderText {
    #[serde(default, deserialize_with = "lenient_string")]
    pub header_text_lines: Option<String>,
}

/// Structured header fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderData {
    #[serde(default)]
    pub doc_number: Option<Value>,
    #[serde(default)]
    pub tin: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
}

/// A sold item. Amounts are minor currency units.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellLine {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vat_id: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub total: Option<Value>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_storno: bool,
}

/// A discount for the sell line printed right above it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountLine {
    #[serde(default, deserialize_with = "lenient_string")]
    pub vat_id: Option<String>,
    #[serde(default)]
    pub base: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Payment tender line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// Receipt total in the receipt currency.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumInCurrency {
    #[serde(default)]
    pub fiscal_total: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
}

/// Sum of all discounts on the receipt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSummary {
    #[serde(default)]
    pub discounts: Option<Value>,
}

/// Fiscal footer: bill number and ISO-8601 timestamp.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalFooter {
    #[serde(default)]
    pub bill_number: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
}

/// Additional free-text line; `data` may hold inline HTML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLine {
    #[serde(default, deserialize_with = "lenient_string")]
    pub data: Option<String>,
}

/// Structured store record used by some exports.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
}

// =============================================================================
// Tagged Unions
// =============================================================================

/// One element of the `header` array.
#[derive(Debug, Clone)]
pub enum HeaderEntry {
    Text(HeaderText),
    Data(HeaderData),
    Unknown(String),
}

/// One element of the `body` array.
#[derive(Debug, Clone)]
pub enum BodyEvent {
    SellLine(SellLine),
    DiscountLine(DiscountLine),
    Payment(Payment),
    SumInCurrency(SumInCurrency),
    DiscountSummary(DiscountSummary),
    FiscalFooter(FiscalFooter),
    AddLine(AddLine),
    Store(StoreRecord),
    Unknown(String),
}

impl BodyEvent {
    /// Wire tag of this event.
    pub fn kind(&self) -> &str {
        match self {
            BodyEvent::SellLine(_) => "sellLine",
            BodyEvent::DiscountLine(_) => "discountLine",
            BodyEvent::Payment(_) => "payment",
            BodyEvent::SumInCurrency(_) => "sumInCurrency",
            BodyEvent::DiscountSummary(_) => "discountSummary",
            BodyEvent::FiscalFooter(_) => "fiscalFooter",
            BodyEvent::AddLine(_) => "addLine",
            BodyEvent::Store(_) => "store",
            BodyEvent::Unknown(tag) => tag,
        }
    }
}

// =============================================================================
// Document
// =============================================================================

/// A decoded receipt export.
#[derive(Debug, Clone, Default)]
pub struct ReceiptDocument {
    pub header: Vec<HeaderEntry>,
    pub body: Vec<BodyEvent>,
    /// Top-level `fiscal` object; overrides footer fields when present.
    pub fiscal: Option<FiscalFooter>,
    /// Top-level `payment` object; fallback for the payment label.
    pub payment: Option<Payment>,
    /// Top-level `store` object; fallback for store fields.
    pub store: Option<StoreRecord>,
    /// Top-level `receiptNumber`, if the export carries one.
    pub receipt_number: Option<Value>,
}

impl ReceiptDocument {
    /// Decodes a document from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    /// Decodes a document from an already parsed JSON value.
    ///
    /// ## Errors
    /// - [`ParseError::NotAnObject`] when the root is not an object
    /// - [`ParseError::MissingSection`] when `body` is absent or not an array
    /// - [`ParseError::EmptyBody`] when `body` holds no events
    /// - [`ParseError::MalformedEvent`] when a known event has the wrong shape
    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        let root = value.as_object().ok_or(ParseError::NotAnObject)?;

        let body_items = root
            .get("body")
            .and_then(Value::as_array)
            .ok_or(ParseError::MissingSection("body"))?;
        if body_items.is_empty() {
            return Err(ParseError::EmptyBody);
        }

        let header = match root.get("header").and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| decode_header_entry(index, item))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let body = body_items
            .iter()
            .enumerate()
            .map(|(index, item)| decode_body_event(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReceiptDocument {
            header,
            body,
            fiscal: decode_optional(root, "fiscal"),
            payment: decode_optional(root, "payment"),
            store: decode_optional(root, "store"),
            receipt_number: root.get("receiptNumber").cloned(),
        })
    }

    /// Body events in print order.
    pub fn events(&self) -> impl Iterator<Item = &BodyEvent> {
        self.body.iter()
    }
}

// =============================================================================
// Decoding Helpers
// =============================================================================

/// Returns the first `(tag, payload)` pair of a single-key object.
fn single_entry(item: &Value) -> Option<(&String, &Value)> {
    item.as_object().and_then(|map| map.iter().next())
}

fn decode_payload<T: DeserializeOwned>(
    index: usize,
    kind: &str,
    payload: &Value,
) -> Result<T, ParseError> {
    serde_json::from_value(payload.clone()).map_err(|e| ParseError::MalformedEvent {
        index,
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

fn decode_header_entry(index: usize, item: &Value) -> Result<HeaderEntry, ParseError> {
    let Some((tag, payload)) = single_entry(item) else {
        return Ok(HeaderEntry::Unknown(String::new()));
    };

    Ok(match tag.as_str() {
        "headerText" => HeaderEntry::Text(decode_payload(index, tag, payload)?),
        "headerData" => HeaderEntry::Data(decode_payload(index, tag, payload)?),
        other => HeaderEntry::Unknown(other.to_string()),
    })
}

fn decode_body_event(index: usize, item: &Value) -> Result<BodyEvent, ParseError> {
    let Some((tag, payload)) = single_entry(item) else {
        return Ok(BodyEvent::Unknown(String::new()));
    };

    Ok(match tag.as_str() {
        "sellLine" => BodyEvent::SellLine(decode_payload(index, tag, payload)?),
        "discountLine" => BodyEvent::DiscountLine(decode_payload(index, tag, payload)?),
        "payment" => BodyEvent::Payment(decode_payload(index, tag, payload)?),
        "sumInCurrency" => BodyEvent::SumInCurrency(decode_payload(index, tag, payload)?),
        "discountSummary" => BodyEvent::DiscountSummary(decode_payload(index, tag, payload)?),
        "fiscalFooter" => BodyEvent::FiscalFooter(decode_payload(index, tag, payload)?),
        "addLine" => BodyEvent::AddLine(decode_payload(index, tag, payload)?),
        "store" => BodyEvent::Store(decode_payload(index, tag, payload)?),
        other => BodyEvent::Unknown(other.to_string()),
    })
}

/// Text field: strings as-is, numbers printed, anything else absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(Option::unwrap_or_default)
}

/// Flag field: only a JSON `true` is set.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(
        Option::<Value>::deserialize(deserializer)?,
        Some(Value::Bool(true))
    ))
}

/// Top-level optional objects are best effort: a wrong shape is ignored.
fn decode_optional<T: DeserializeOwned>(root: &Map<String, Value>, key: &str) -> Option<T> {
    root.get(key)
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Renders a scalar JSON value the way the export means it.
///
/// Strings are trimmed, numbers are printed, everything else is `None`.
/// Empty results are `None` so callers can chain fallbacks with `or_else`.
pub fn scalar_to_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_known_events_in_order() {
        let doc = ReceiptDocument::from_value(&json!({
            "header": [{"headerData": {"docNumber": 17}}],
            "body": [
                {"sellLine": {"name": "Chleb A", "price": 450}},
                {"discountLine": {"vatId": "A", "base": 450, "value": 50}},
                {"vatSummary": {"vatRatesSummary": []}},
                {"fiscalFooter": {"billNumber": "123", "date": "2024-05-01T10:00:00Z"}}
            ]
        }))
        .unwrap();

        let kinds: Vec<&str> = doc.events().map(BodyEvent::kind).collect();
        assert_eq!(kinds, ["sellLine", "discountLine", "vatSummary", "fiscalFooter"]);
        assert!(matches!(doc.body[2], BodyEvent::Unknown(_)));
        assert!(matches!(doc.header[0], HeaderEntry::Data(_)));
    }

    #[test]
    fn test_rejects_structurally_broken_documents() {
        assert!(matches!(
            ReceiptDocument::from_value(&json!([1, 2])),
            Err(ParseError::NotAnObject)
        ));
        assert!(matches!(
            ReceiptDocument::from_value(&json!({"header": []})),
            Err(ParseError::MissingSection("body"))
        ));
        assert!(matches!(
            ReceiptDocument::from_value(&json!({"body": []})),
            Err(ParseError::EmptyBody)
        ));
        assert!(matches!(
            ReceiptDocument::from_slice(b"{not json"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_malformed_known_event_reports_position() {
        let err = ReceiptDocument::from_value(&json!({
            "body": [
                {"payment": {"name": "Karta"}},
                {"sellLine": "Chleb A"}
            ]
        }))
        .unwrap_err();

        match err {
            ParseError::MalformedEvent { index, kind, .. } => {
                assert_eq!(index, 1);
                assert_eq!(kind, "sellLine");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_fields_fall_back_to_defaults() {
        let doc = ReceiptDocument::from_value(&json!({
            "header": [{"headerText": {"headerTextLines": 5}}],
            "body": [
                {"sellLine": {"name": null, "vatId": 1, "isStorno": null, "price": 100}},
                {"sellLine": {"name": "Woda B", "isStorno": "yes"}},
                {"payment": {"name": 1234}},
                {"sumInCurrency": {"fiscalTotal": 100, "currency": null}},
                {"addLine": {"data": ["x"]}}
            ]
        }))
        .unwrap();

        let BodyEvent::SellLine(first) = &doc.body[0] else {
            panic!("expected sellLine");
        };
        assert_eq!(first.name, "");
        assert_eq!(first.vat_id.as_deref(), Some("1"));
        assert!(!first.is_storno);

        let BodyEvent::SellLine(second) = &doc.body[1] else {
            panic!("expected sellLine");
        };
        assert!(!second.is_storno);

        let BodyEvent::Payment(payment) = &doc.body[2] else {
            panic!("expected payment");
        };
        assert_eq!(payment.name.as_deref(), Some("1234"));

        let BodyEvent::AddLine(add) = &doc.body[4] else {
            panic!("expected addLine");
        };
        assert!(add.data.is_none());

        let HeaderEntry::Text(text) = &doc.header[0] else {
            panic!("expected headerText");
        };
        assert_eq!(text.header_text_lines.as_deref(), Some("5"));
    }

    #[test]
    fn test_storno_flag_only_true_when_set() {
        let doc = ReceiptDocument::from_value(&json!({
            "body": [{"sellLine": {"name": "Mleko A", "isStorno": true}}]
        }))
        .unwrap();
        assert!(matches!(&doc.body[0], BodyEvent::SellLine(line) if line.is_storno));
    }

    #[test]
    fn test_non_object_elements_are_ignored() {
        let doc = ReceiptDocument::from_value(&json!({
            "body": ["stray", {"sellLine": {"name": "Woda B"}}]
        }))
        .unwrap();
        assert!(matches!(doc.body[0], BodyEvent::Unknown(_)));
        assert!(matches!(doc.body[1], BodyEvent::SellLine(_)));
    }

    #[test]
    fn test_top_level_objects() {
        let doc = ReceiptDocument::from_value(&json!({
            "body": [{"payment": {"name": "Karta"}}],
            "fiscal": {"billNumber": 99},
            "store": {"name": "Lidl", "city": "Poznań"},
            "payment": "not-an-object",
            "receiptNumber": "R-1"
        }))
        .unwrap();

        assert!(doc.fiscal.is_some());
        assert_eq!(doc.store.unwrap().name.as_deref(), Some("Lidl"));
        assert!(doc.payment.is_none());
        assert_eq!(scalar_to_string(doc.receipt_number.as_ref()).as_deref(), Some("R-1"));
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(Some(&json!(42))).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(Some(&json!(" 7 "))).as_deref(), Some("7"));
        assert_eq!(scalar_to_string(Some(&json!(""))), None);
        assert_eq!(scalar_to_string(Some(&json!(null))), None);
        assert_eq!(scalar_to_string(None), None);
    }
}
