//! Presentation structure of a report: header, month groups with label and
//! summary rows, and the collapse/style hints a backend may apply.

use std::ops::Range;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::row::{
    format_amount, month_name_pl, ReportRow, COLUMN_COUNT, GROSS_COLUMN, GROUP_LABEL_PREFIX,
    HEADERS, NET_COLUMN,
};

const UNDATED_LABEL: &str = "BEZ DATY";

/// Calendar month of a group; undated rows sort after every month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKey {
    Month { year: i32, month: u32 },
    Undated,
}

impl PeriodKey {
    pub fn of(row: &ReportRow) -> Self {
        match row.issue_day() {
            Some(d) => Self::from_date(d),
            None => Self::Undated,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Month { year, month } => {
                format!("{GROUP_LABEL_PREFIX} {} {year} {GROUP_LABEL_PREFIX}", month_name_pl(*month))
            }
            Self::Undated => format!("{GROUP_LABEL_PREFIX} {UNDATED_LABEL} {GROUP_LABEL_PREFIX}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodGroup {
    pub key: PeriodKey,
    pub label: String,
    pub label_row: usize,
    pub summary_row: Option<usize>,
    /// Rows hidden when the group is collapsed: the summary row (if any) and members.
    pub rows: Range<usize>,
    pub count: usize,
    pub net_total: f64,
    pub gross_total: f64,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKind {
    Header,
    GroupLabel,
    Summary,
    Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRegion {
    pub kind: StyleKind,
    pub rows: Range<usize>,
    pub columns: Range<usize>,
}

/// A fully computed report, ready to be written in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub rows: Vec<Vec<String>>,
    pub groups: Vec<PeriodGroup>,
    pub styles: Vec<StyleRegion>,
}

impl ReportLayout {
    /// Lay out `rows`, which must already be sorted by issue date with
    /// undated rows last. The group of `today`'s month stays expanded.
    pub fn build(rows: &[ReportRow], today: NaiveDate, summary_rows: bool) -> Self {
        let current = PeriodKey::from_date(today);
        let mut out: Vec<Vec<String>> = vec![HEADERS.iter().map(|h| h.to_string()).collect()];
        let mut groups = Vec::new();
        let mut styles = vec![StyleRegion {
            kind: StyleKind::Header,
            rows: 0..1,
            columns: 0..COLUMN_COUNT,
        }];

        for members in rows.chunk_by(|a, b| PeriodKey::of(a) == PeriodKey::of(b)) {
            let key = PeriodKey::of(&members[0]);
            let label = key.label();
            let label_row = out.len();
            out.push(vec![label.clone()]);
            styles.push(StyleRegion {
                kind: StyleKind::GroupLabel,
                rows: label_row..label_row + 1,
                columns: 0..COLUMN_COUNT,
            });

            let net_total: f64 = members.iter().map(|r| r.net_amount).sum();
            let gross_total: f64 = members.iter().map(|r| r.gross_amount).sum();

            let summary_row = summary_rows.then(|| {
                let idx = out.len();
                out.push(summary_cells(members.len(), net_total, gross_total));
                styles.push(StyleRegion {
                    kind: StyleKind::Summary,
                    rows: idx..idx + 1,
                    columns: 0..COLUMN_COUNT,
                });
                idx
            });

            out.extend(members.iter().map(ReportRow::to_cells));

            groups.push(PeriodGroup {
                collapsed: key != current,
                key,
                label,
                label_row,
                summary_row,
                rows: label_row + 1..out.len(),
                count: members.len(),
                net_total,
                gross_total,
            });
        }

        if out.len() > 1 {
            styles.push(StyleRegion {
                kind: StyleKind::Currency,
                rows: 1..out.len(),
                columns: NET_COLUMN..GROSS_COLUMN + 1,
            });
        }

        Self {
            rows: out,
            groups,
            styles,
        }
    }

    pub fn data_row_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Summary rows leave the id column empty so they are never read back as data.
fn summary_cells(count: usize, net_total: f64, gross_total: f64) -> Vec<String> {
    let mut cells = vec![String::new(); COLUMN_COUNT];
    cells[1] = format!("Razem: {count}");
    cells[NET_COLUMN] = format_amount(net_total);
    cells[GROSS_COLUMN] = format_amount(gross_total);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::row::Annotations;

    fn row(id: &str, date: &str, net: f64) -> ReportRow {
        ReportRow {
            record_id: id.into(),
            counterparty_name: "ACME".into(),
            document_number: format!("FV/{id}"),
            issue_date: date.into(),
            due_date: String::new(),
            net_amount: net,
            gross_amount: net * 1.23,
            annotations: Annotations::default(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            PeriodKey::Month { year: 2025, month: 1 }.label(),
            "--- STYCZEŃ 2025 ---"
        );
        assert_eq!(PeriodKey::Undated.label(), "--- BEZ DATY ---");
        assert!(PeriodKey::Month { year: 9999, month: 12 } < PeriodKey::Undated);
    }

    #[test]
    fn test_groups_with_summary_rows() {
        let rows = vec![
            row("a", "2025-01-05", 100.0),
            row("b", "2025-01-20", 50.0),
            row("c", "2025-02-01", 10.0),
            row("d", "garbage", 1.0),
        ];
        let layout = ReportLayout::build(&rows, today(), true);

        assert_eq!(layout.rows[0][0], "KSeF ID");
        assert_eq!(layout.groups.len(), 3);

        let jan = &layout.groups[0];
        assert_eq!(jan.label, "--- STYCZEŃ 2025 ---");
        assert_eq!(jan.label_row, 1);
        assert_eq!(jan.summary_row, Some(2));
        assert_eq!(jan.rows, 2..5);
        assert_eq!(jan.count, 2);
        assert_eq!(jan.net_total, 150.0);
        assert!(jan.collapsed);
        assert_eq!(layout.rows[2][0], "");
        assert_eq!(layout.rows[2][NET_COLUMN], "150.00");
        assert_eq!(layout.rows[3][0], "a");

        let feb = &layout.groups[1];
        assert!(!feb.collapsed);
        assert_eq!(feb.count, 1);

        let undated = &layout.groups[2];
        assert_eq!(undated.key, PeriodKey::Undated);
        assert!(undated.collapsed);
        assert_eq!(layout.rows.last().unwrap()[0], "d");

        assert_eq!(layout.data_row_count(), 4);
    }

    #[test]
    fn test_without_summary_rows() {
        let rows = vec![row("a", "2025-01-05", 1.0), row("b", "2025-02-05", 1.0)];
        let layout = ReportLayout::build(&rows, today(), false);
        assert_eq!(layout.rows.len(), 1 + 2 + 2);
        assert!(layout.groups.iter().all(|g| g.summary_row.is_none()));
        assert_eq!(layout.groups[0].rows, 2..3);
    }

    #[test]
    fn test_style_regions() {
        let rows = vec![row("a", "2025-01-05", 1.0)];
        let layout = ReportLayout::build(&rows, today(), true);
        let kinds: Vec<StyleKind> = layout.styles.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StyleKind::Header,
                StyleKind::GroupLabel,
                StyleKind::Summary,
                StyleKind::Currency
            ]
        );
        let currency = layout.styles.last().unwrap();
        assert_eq!(currency.columns, 5..7);
        assert_eq!(currency.rows, 1..4);
    }

    #[test]
    fn test_empty_report_is_header_only() {
        let layout = ReportLayout::build(&[], today(), true);
        assert_eq!(layout.rows.len(), 1);
        assert!(layout.groups.is_empty());
        assert_eq!(layout.styles.len(), 1);
    }
}
