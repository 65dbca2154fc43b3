//! CSV report backend.
//!
//! Each report is `<directory>/<name>.csv`. Group and style hints go to a
//! `<name>.layout.json` sidecar. Both are written to a temporary file and
//! renamed into place, so readers never see a half-written report.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use super::layout::{PeriodGroup, ReportLayout, StyleRegion};
use super::{Report, ReportBackend, ReportError};

#[derive(Debug, Clone)]
pub struct CsvReportBackend {
    directory: PathBuf,
}

impl CsvReportBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl ReportBackend for CsvReportBackend {
    async fn open_or_create(&self, name: &str) -> Result<Box<dyn Report>, ReportError> {
        let file_stem = sanitize_report_name(name)?;
        let directory = self.directory.clone();
        let report = tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&directory).map_err(|e| io_error(&directory, e))?;
            let report = CsvReport {
                path: directory.join(format!("{file_stem}.csv")),
                sidecar_path: directory.join(format!("{file_stem}.layout.json")),
            };
            if !report.path.exists() {
                tracing::info!(path = %report.path.display(), "Creating report");
                File::create(&report.path).map_err(|e| io_error(&report.path, e))?;
            }
            Ok::<_, ReportError>(report)
        })
        .await??;
        Ok(Box::new(report))
    }
}

#[derive(Debug, Clone)]
pub struct CsvReport {
    path: PathBuf,
    sidecar_path: PathBuf,
}

#[derive(Serialize)]
struct LayoutHints<'a> {
    groups: &'a [PeriodGroup],
    styles: &'a [StyleRegion],
}

impl CsvReport {
    fn read_blocking(&self) -> Result<Vec<Vec<String>>, ReportError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn write_blocking(&self, layout: &ReportLayout) -> Result<(), ReportError> {
        let tmp = tmp_path(&self.path);
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)?;
            for row in &layout.rows {
                writer.write_record(row)?;
            }
            writer.flush().map_err(|e| io_error(&tmp, e))?;
        }

        let hints = serde_json::to_vec_pretty(&LayoutHints {
            groups: &layout.groups,
            styles: &layout.styles,
        })?;
        let sidecar_tmp = tmp_path(&self.sidecar_path);
        fs::write(&sidecar_tmp, hints).map_err(|e| io_error(&sidecar_tmp, e))?;

        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;
        fs::rename(&sidecar_tmp, &self.sidecar_path).map_err(|e| io_error(&self.sidecar_path, e))?;
        Ok(())
    }

    fn clear_blocking(&self) -> Result<(), ReportError> {
        File::create(&self.path).map_err(|e| io_error(&self.path, e))?;
        match fs::remove_file(&self.sidecar_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.sidecar_path, e)),
        }
    }
}

#[async_trait]
impl Report for CsvReport {
    async fn read_all(&self) -> Result<Vec<Vec<String>>, ReportError> {
        let report = self.clone();
        tokio::task::spawn_blocking(move || report.read_blocking()).await?
    }

    async fn write_all(&self, layout: &ReportLayout) -> Result<(), ReportError> {
        let report = self.clone();
        let rows = layout.rows.len();
        let layout = layout.clone();
        tokio::task::spawn_blocking(move || report.write_blocking(&layout)).await??;
        tracing::debug!(path = %self.path.display(), rows, "Report written");
        Ok(())
    }

    async fn clear(&self) -> Result<(), ReportError> {
        let report = self.clone();
        tokio::task::spawn_blocking(move || report.clear_blocking()).await?
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Turn a report target reference into a file stem.
fn sanitize_report_name(name: &str) -> Result<String, ReportError> {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        return Err(ReportError::InvalidName(name.to_string()));
    }
    Ok(stem)
}
