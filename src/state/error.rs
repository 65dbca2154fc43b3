use std::path::PathBuf;

use thiserror::Error;

/// Failures of the checkpoint / run-history database and the tenant locks.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cannot open state database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("State database schema update failed: {0}")]
    Migration(#[from] rusqlite::Error),

    #[error("State query failed: {0}")]
    Query(String),

    #[error("State task panicked or was cancelled: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("State database is at schema {found}; this build understands up to {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    #[error("Tenant lock file {path} unusable: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StateError {
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
