//! Report storage seam and the reconcile/layout logic feeding it.

pub mod csv_store;
pub mod layout;
pub mod reconcile;
pub mod row;

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use csv_store::CsvReportBackend;
pub use layout::ReportLayout;
pub use reconcile::{merge, MergeOptions, MergeOutcome};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed report file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed layout sidecar: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid report name '{0}'")]
    InvalidName(String),

    #[error("Report task failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}

/// Opens reports by their target reference (e.g. a tenant's sheet name).
#[async_trait]
pub trait ReportBackend: Send + Sync {
    async fn open_or_create(&self, name: &str) -> Result<Box<dyn Report>, ReportError>;
}

/// One tabular report. `write_all` replaces the whole content at once.
#[async_trait]
pub trait Report: Send + Sync {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, ReportError>;

    async fn write_all(&self, layout: &ReportLayout) -> Result<(), ReportError>;

    async fn clear(&self) -> Result<(), ReportError>;

    /// Record ids currently present in the report.
    async fn list_existing_ids(&self) -> Result<HashSet<String>, ReportError> {
        let cells = self.read_all().await?;
        Ok(reconcile::parse_existing(&cells)
            .into_iter()
            .map(|r| r.record_id)
            .collect())
    }
}
