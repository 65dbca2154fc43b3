use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::ksef::record::parse_amount;

pub const HEADERS: [&str; 11] = [
    "KSeF ID",
    "Sprzedawca",
    "Nr dokumentu",
    "Data",
    "TERMIN",
    "Netto",
    "Brutto",
    "Kategoria",
    "PŁATNOŚĆ",
    "LOKAL",
    "UWAGI",
];

pub const COLUMN_COUNT: usize = HEADERS.len();
pub const NET_COLUMN: usize = 5;
pub const GROSS_COLUMN: usize = 6;
/// First of the four operator-owned columns.
pub const ANNOTATION_COLUMN: usize = 7;

/// Marks a period group label row in the first column.
pub const GROUP_LABEL_PREFIX: &str = "---";

const MONTHS_PL: [&str; 12] = [
    "STYCZEŃ",
    "LUTY",
    "MARZEC",
    "KWIECIEŃ",
    "MAJ",
    "CZERWIEC",
    "LIPIEC",
    "SIERPIEŃ",
    "WRZESIEŃ",
    "PAŹDZIERNIK",
    "LISTOPAD",
    "GRUDZIEŃ",
];

pub fn month_name_pl(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTHS_PL.get(i as usize))
        .copied()
        .unwrap_or("MIESIĄC")
}

/// Operator-entered columns. Never written by the sync, only carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub category: String,
    pub payment_note: String,
    pub location_note: String,
    pub free_text_note: String,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.category.is_empty()
            && self.payment_note.is_empty()
            && self.location_note.is_empty()
            && self.free_text_note.is_empty()
    }

    fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(ANNOTATION_COLUMN + i).cloned().unwrap_or_default();
        Self {
            category: cell(0),
            payment_note: cell(1),
            location_note: cell(2),
            free_text_note: cell(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub record_id: String,
    pub counterparty_name: String,
    pub document_number: String,
    pub issue_date: String,
    pub due_date: String,
    pub net_amount: f64,
    pub gross_amount: f64,
    pub annotations: Annotations,
}

impl ReportRow {
    /// Parse a data row. Missing trailing cells read as empty.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        Self {
            record_id: cell(0),
            counterparty_name: cell(1),
            document_number: cell(2),
            issue_date: cell(3),
            due_date: cell(4),
            net_amount: parse_amount(&cell(NET_COLUMN)).unwrap_or(0.0),
            gross_amount: parse_amount(&cell(GROSS_COLUMN)).unwrap_or(0.0),
            annotations: Annotations::from_cells(cells),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.record_id.clone(),
            self.counterparty_name.clone(),
            self.document_number.clone(),
            self.issue_date.clone(),
            self.due_date.clone(),
            format_amount(self.net_amount),
            format_amount(self.gross_amount),
            self.annotations.category.clone(),
            self.annotations.payment_note.clone(),
            self.annotations.location_note.clone(),
            self.annotations.free_text_note.clone(),
        ]
    }

    pub fn issue_day(&self) -> Option<NaiveDate> {
        parse_report_date(&self.issue_date)
    }
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive ISO datetimes.
pub fn parse_report_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}
