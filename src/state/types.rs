//! Types for the state tracking module.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format of a checkpoint boundary: second precision, explicit UTC offset.
const CHECKPOINT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Render a boundary the way it is persisted, e.g. `2022-03-02T00:00:00+00:00`.
pub fn format_checkpoint(boundary: DateTime<Utc>) -> String {
    boundary.format(CHECKPOINT_FORMAT).to_string()
}

/// Parse a persisted boundary. Accepts any RFC 3339 offset, plus a bare
/// datetime without offset which is taken as UTC.
pub fn parse_checkpoint(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// How a tenant's sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Records fetched, merged and written.
    Success,
    /// Tenant-scoped failure; the batch carried on.
    Failed,
    /// Tenant not attempted (missing secret, lock held elsewhere).
    Skipped,
    /// Batch-fatal failure; the whole run stopped here.
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics recorded when a tenant's sync run completes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRunStats {
    pub fetched: u64,
    pub skipped_duplicates: u64,
    pub written: u64,
    pub outcome: RunOutcome,
    pub error: Option<String>,
}

/// A row of the `sync_runs` table.
#[derive(Debug, Clone)]
pub struct SyncRunRecord {
    pub tenant_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched: u64,
    pub skipped_duplicates: u64,
    pub written: u64,
    /// `None` while the run is in progress, or if it never completed.
    pub outcome: Option<RunOutcome>,
    pub error: Option<String>,
}

/// Stored checkpoint for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub tenant_id: String,
    pub boundary: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_checkpoint() {
        let dt = Utc.with_ymd_and_hms(2022, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(format_checkpoint(dt), "2022-03-02T00:00:00+00:00");
    }

    #[test]
    fn test_parse_checkpoint_variants() {
        let expected = Utc.with_ymd_and_hms(2022, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_checkpoint("2022-03-02T00:00:00+00:00"), Some(expected));
        assert_eq!(parse_checkpoint("2022-03-02T01:00:00+01:00"), Some(expected));
        assert_eq!(parse_checkpoint("2022-03-02T00:00:00"), Some(expected));
        assert_eq!(parse_checkpoint("not a date"), None);
    }

    #[test]
    fn test_run_outcome_roundtrip() {
        for outcome in [
            RunOutcome::Success,
            RunOutcome::Failed,
            RunOutcome::Skipped,
            RunOutcome::Aborted,
        ] {
            assert_eq!(RunOutcome::from_str(outcome.as_str()), Some(outcome));
        }
        assert_eq!(RunOutcome::from_str("bogus"), None);
    }
}
