//! Merge freshly fetched records into an existing report.
//!
//! Existing rows are authoritative: a fetched record whose id is already in
//! the report is skipped, so operator-entered annotations survive every run.
//! The merged set is re-sorted by issue date and re-grouped by month.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::ksef::record::{RawRecord, DEFAULT_CURRENCY};

use super::layout::ReportLayout;
use super::row::{parse_report_date, Annotations, ReportRow, GROUP_LABEL_PREFIX, HEADERS};

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Decides which month group stays expanded.
    pub today: NaiveDate,
    pub summary_rows: bool,
    /// Timestamp embedded in synthetic ids.
    pub now_millis: i64,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub layout: ReportLayout,
    pub accepted: usize,
    pub skipped_duplicates: usize,
    pub total_rows: usize,
}

pub fn is_duplicate(existing_ids: &HashSet<String>, candidate_id: &str) -> bool {
    existing_ids.contains(candidate_id)
}

/// Data rows of a previously written report, first occurrence of each id wins.
///
/// Header, group label and summary rows are dropped, as are rows whose id
/// cell is blank. Annotations of dropped repeats fill a kept row's blanks.
pub fn parse_existing(cells: &[Vec<String>]) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for line in cells {
        let Some(first) = line.first().map(|c| c.trim()) else {
            continue;
        };
        if first.is_empty() || first == HEADERS[0] || first.starts_with(GROUP_LABEL_PREFIX) {
            continue;
        }
        let row = ReportRow::from_cells(line);
        match position.get(&row.record_id) {
            Some(&idx) => {
                tracing::debug!(id = %row.record_id, "Dropping repeated report row");
                if rows[idx].annotations.is_empty() && !row.annotations.is_empty() {
                    rows[idx].annotations = row.annotations;
                }
            }
            None => {
                position.insert(row.record_id.clone(), rows.len());
                rows.push(row);
            }
        }
    }
    rows
}

/// Id for a record the gateway returned without one.
pub fn synthetic_id(issue_date: Option<&str>, now_millis: i64, index: usize) -> String {
    let date = issue_date
        .and_then(parse_report_date)
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| "nodate".to_string());
    format!("SYN-{date}-{now_millis}-{index}")
}

fn candidate_row(record: &RawRecord, index: usize, now_millis: i64) -> ReportRow {
    let issue_date = record.issue_date();
    let record_id = record.record_id().unwrap_or_else(|| {
        let id = synthetic_id(issue_date.as_deref(), now_millis, index);
        tracing::warn!(id = %id, "Record has no KSeF number; using a synthetic id");
        id
    });
    let currency = record.currency();
    if currency != DEFAULT_CURRENCY {
        tracing::info!(
            id = %record_id,
            %currency,
            counterparty_nip = %record.counterparty_tax_id(),
            "Invoice not in PLN; amounts kept in the invoice currency"
        );
    }
    ReportRow {
        record_id,
        counterparty_name: record.counterparty_name(),
        document_number: record.document_number(),
        issue_date: issue_date.unwrap_or_default(),
        due_date: record.due_date().unwrap_or_default(),
        net_amount: record.net_amount(),
        gross_amount: record.gross_amount(),
        annotations: Annotations::default(),
    }
}

pub fn merge(
    existing_cells: &[Vec<String>],
    new_records: &[RawRecord],
    options: &MergeOptions,
) -> MergeOutcome {
    let mut rows = parse_existing(existing_cells);
    let mut known: HashSet<String> = rows.iter().map(|r| r.record_id.clone()).collect();

    let mut accepted = 0;
    let mut skipped_duplicates = 0;
    for (index, record) in new_records.iter().enumerate() {
        let candidate = candidate_row(record, index, options.now_millis);
        if is_duplicate(&known, &candidate.record_id) {
            skipped_duplicates += 1;
            continue;
        }
        known.insert(candidate.record_id.clone());
        rows.push(candidate);
        accepted += 1;
    }

    // Stable: equal dates keep existing-then-new order.
    rows.sort_by_key(|r| {
        let day = r.issue_day();
        (day.is_none(), day)
    });

    let total_rows = rows.len();
    let layout = ReportLayout::build(&rows, options.today, options.summary_rows);
    tracing::debug!(accepted, skipped_duplicates, total_rows, "Merged report");

    MergeOutcome {
        layout,
        accepted,
        skipped_duplicates,
        total_rows,
    }
}
