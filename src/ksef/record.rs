//! Typed access to invoice header records returned by the metadata query.
//!
//! The gateway has used several names for the same field across API
//! revisions, so every field the report needs is read through an ordered
//! chain of JSON paths: the first path that resolves to a usable value wins.

use serde_json::{Map, Value};

/// A JSON path into a record, e.g. `&["seller", "name"]`.
type FieldPath = &'static [&'static str];

pub(crate) const RECORD_ID: &[FieldPath] = &[&["ksefNumber"], &["ksefReferenceNumber"]];
pub(crate) const DOCUMENT_NUMBER: &[FieldPath] =
    &[&["invoiceNumber"], &["invoiceReferenceNumber"]];
pub(crate) const COUNTERPARTY_NAME: &[FieldPath] = &[&["seller", "name"], &["subjectBy", "name"]];
pub(crate) const COUNTERPARTY_TAX_ID: &[FieldPath] = &[
    &["seller", "nip"],
    &["seller", "identifier", "value"],
    &["subjectBy", "identifier", "value"],
];
pub(crate) const ISSUE_DATE: &[FieldPath] = &[&["invoicingDate"], &["issueDate"]];
pub(crate) const DUE_DATE: &[FieldPath] = &[&["paymentDueDate"], &["dueDate"]];
pub(crate) const NET_AMOUNT: &[FieldPath] = &[&["netAmount"], &["net"]];
pub(crate) const GROSS_AMOUNT: &[FieldPath] = &[&["grossAmount"], &["gross"]];
pub(crate) const CURRENCY: &[FieldPath] = &[&["currency"]];

pub(crate) const DEFAULT_DOCUMENT_NUMBER: &str = "N/A";
pub(crate) const DEFAULT_COUNTERPARTY_NAME: &str = "Unknown";
pub(crate) const DEFAULT_COUNTERPARTY_TAX_ID: &str = "N/A";
pub(crate) const DEFAULT_CURRENCY: &str = "PLN";

/// One invoice header as returned by the gateway. Opaque apart from the
/// accessors below.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; anything other than an object becomes an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                tracing::warn!("Ignoring non-object invoice entry: {}", other);
                Self(Map::new())
            }
        }
    }

    fn lookup(&self, path: FieldPath) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.get(*key)?;
        }
        Some(current)
    }

    /// First non-empty string (numbers are rendered as strings) along the chain.
    pub(crate) fn first_str(&self, chain: &[FieldPath]) -> Option<String> {
        chain.iter().find_map(|path| match self.lookup(path)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First value along the chain that parses as a number.
    pub(crate) fn first_amount(&self, chain: &[FieldPath]) -> Option<f64> {
        chain.iter().find_map(|path| match self.lookup(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_amount(s),
            _ => None,
        })
    }

    pub fn record_id(&self) -> Option<String> {
        self.first_str(RECORD_ID)
    }

    pub fn document_number(&self) -> String {
        self.first_str(DOCUMENT_NUMBER)
            .unwrap_or_else(|| DEFAULT_DOCUMENT_NUMBER.to_string())
    }

    pub fn counterparty_name(&self) -> String {
        self.first_str(COUNTERPARTY_NAME)
            .unwrap_or_else(|| DEFAULT_COUNTERPARTY_NAME.to_string())
    }

    pub fn counterparty_tax_id(&self) -> String {
        self.first_str(COUNTERPARTY_TAX_ID)
            .unwrap_or_else(|| DEFAULT_COUNTERPARTY_TAX_ID.to_string())
    }

    pub fn issue_date(&self) -> Option<String> {
        self.first_str(ISSUE_DATE)
    }

    pub fn due_date(&self) -> Option<String> {
        self.first_str(DUE_DATE)
    }

    pub fn net_amount(&self) -> f64 {
        self.first_amount(NET_AMOUNT).unwrap_or(0.0)
    }

    pub fn gross_amount(&self) -> f64 {
        self.first_amount(GROSS_AMOUNT).unwrap_or(0.0)
    }

    pub fn currency(&self) -> String {
        self.first_str(CURRENCY)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }
}

/// Parse an amount written either as `1234.56` or `1 234,56`.
pub(crate) fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        RawRecord::from_value(value)
    }

    #[test]
    fn test_primary_fields() {
        let r = record(json!({
            "ksefNumber": "5265877635-20250115-0100001A2B3C-4D",
            "invoiceNumber": "FV/1/2025",
            "seller": {"nip": "5265877635", "name": "ACME Sp. z o.o."},
            "invoicingDate": "2025-01-15",
            "netAmount": 100.0,
            "grossAmount": 123.0,
            "currency": "EUR"
        }));
        assert_eq!(
            r.record_id().as_deref(),
            Some("5265877635-20250115-0100001A2B3C-4D")
        );
        assert_eq!(r.document_number(), "FV/1/2025");
        assert_eq!(r.counterparty_name(), "ACME Sp. z o.o.");
        assert_eq!(r.counterparty_tax_id(), "5265877635");
        assert_eq!(r.issue_date().as_deref(), Some("2025-01-15"));
        assert_eq!(r.net_amount(), 100.0);
        assert_eq!(r.gross_amount(), 123.0);
        assert_eq!(r.currency(), "EUR");
    }

    #[test]
    fn test_fallback_aliases() {
        let r = record(json!({
            "ksefReferenceNumber": "REF-1",
            "invoiceReferenceNumber": "INV-9",
            "subjectBy": {"name": "Old API Seller", "identifier": {"value": "111"}},
            "issueDate": "2024-12-01",
            "dueDate": "2024-12-15",
            "net": "10,50",
            "gross": "12.92"
        }));
        assert_eq!(r.record_id().as_deref(), Some("REF-1"));
        assert_eq!(r.document_number(), "INV-9");
        assert_eq!(r.counterparty_name(), "Old API Seller");
        assert_eq!(r.counterparty_tax_id(), "111");
        assert_eq!(r.issue_date().as_deref(), Some("2024-12-01"));
        assert_eq!(r.due_date().as_deref(), Some("2024-12-15"));
        assert_eq!(r.net_amount(), 10.5);
        assert_eq!(r.gross_amount(), 12.92);
    }

    #[test]
    fn test_primary_wins_over_alias() {
        let r = record(json!({
            "invoicingDate": "2025-02-02",
            "issueDate": "2025-02-01"
        }));
        assert_eq!(r.issue_date().as_deref(), Some("2025-02-02"));
    }

    #[test]
    fn test_empty_primary_falls_through() {
        let r = record(json!({"ksefNumber": "  ", "ksefReferenceNumber": "REF-2"}));
        assert_eq!(r.record_id().as_deref(), Some("REF-2"));
    }

    #[test]
    fn test_defaults_when_absent() {
        let r = record(json!({}));
        assert!(r.record_id().is_none());
        assert_eq!(r.document_number(), "N/A");
        assert_eq!(r.counterparty_name(), "Unknown");
        assert_eq!(r.counterparty_tax_id(), "N/A");
        assert!(r.issue_date().is_none());
        assert_eq!(r.net_amount(), 0.0);
        assert_eq!(r.gross_amount(), 0.0);
        assert_eq!(r.currency(), "PLN");
    }

    #[test]
    fn test_malformed_amount_defaults_to_zero() {
        let r = record(json!({"netAmount": "abc", "grossAmount": {"value": 1}}));
        assert_eq!(r.net_amount(), 0.0);
        assert_eq!(r.gross_amount(), 0.0);
    }

    #[test]
    fn test_non_object_becomes_empty() {
        let r = record(json!(["not", "an", "object"]));
        assert!(r.record_id().is_none());
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("1 234,56"), Some(1234.56));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("12zł"), None);
        assert_eq!(parse_amount("NaN"), None);
    }
}
