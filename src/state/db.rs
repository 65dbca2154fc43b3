//! State database trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{
    format_checkpoint, parse_checkpoint, CheckpointRecord, RunOutcome, SyncRunRecord,
    SyncRunStats,
};

/// Trait for state database operations.
///
/// Object-safe, so it can be shared as `Arc<dyn StateDb>`.
#[async_trait]
pub trait StateDb: Send + Sync {
    /// Store the backward-walk boundary for a tenant, replacing any previous one.
    async fn save_checkpoint(
        &self,
        tenant_id: &str,
        boundary: DateTime<Utc>,
    ) -> Result<(), StateError>;

    /// Load a tenant's boundary. An unparseable stored value reads as absent.
    async fn load_checkpoint(&self, tenant_id: &str) -> Result<Option<DateTime<Utc>>, StateError>;

    /// Remove a tenant's boundary. Returns whether one existed.
    async fn clear_checkpoint(&self, tenant_id: &str) -> Result<bool, StateError>;

    async fn list_checkpoints(&self) -> Result<Vec<CheckpointRecord>, StateError>;

    /// Start a sync run for a tenant and return its ID.
    async fn start_sync_run(&self, tenant_id: &str) -> Result<i64, StateError>;

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    /// Most recent run of every tenant that has one, ordered by tenant id.
    async fn latest_runs(&self) -> Result<Vec<SyncRunRecord>, StateError>;
}

/// SQLite implementation of the state database.
pub struct SqliteStateDb {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStateDb {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }
}

#[async_trait]
impl StateDb for SqliteStateDb {
    async fn save_checkpoint(
        &self,
        tenant_id: &str,
        boundary: DateTime<Utc>,
    ) -> Result<(), StateError> {
        let updated_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO checkpoints (tenant_id, boundary, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(tenant_id) DO UPDATE SET
                boundary = excluded.boundary,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![tenant_id, format_checkpoint(boundary), updated_at],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn load_checkpoint(&self, tenant_id: &str) -> Result<Option<DateTime<Utc>>, StateError> {
        let conn = self.lock()?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT boundary FROM checkpoints WHERE tenant_id = ?1",
                [tenant_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::query)?;

        Ok(stored.and_then(|s| {
            let parsed = parse_checkpoint(&s);
            if parsed.is_none() {
                tracing::warn!(tenant = %tenant_id, value = %s, "Ignoring unparseable checkpoint");
            }
            parsed
        }))
    }

    async fn clear_checkpoint(&self, tenant_id: &str) -> Result<bool, StateError> {
        let conn = self.lock()?;
        let rows = conn
            .execute("DELETE FROM checkpoints WHERE tenant_id = ?1", [tenant_id])
            .map_err(StateError::query)?;
        Ok(rows > 0)
    }

    async fn list_checkpoints(&self) -> Result<Vec<CheckpointRecord>, StateError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT tenant_id, boundary, updated_at FROM checkpoints ORDER BY tenant_id")
            .map_err(StateError::query)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(rows
            .into_iter()
            .filter_map(|(tenant_id, boundary, updated_at)| {
                Some(CheckpointRecord {
                    boundary: parse_checkpoint(&boundary)?,
                    updated_at: timestamp_to_datetime(updated_at),
                    tenant_id,
                })
            })
            .collect())
    }

    async fn start_sync_run(&self, tenant_id: &str) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO sync_runs (tenant_id, started_at) VALUES (?1, ?2)",
            rusqlite::params![tenant_id, started_at],
        )
        .map_err(StateError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, fetched = ?2, skipped_duplicates = ?3, written = ?4, outcome = ?5, error = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.fetched as i64,
                stats.skipped_duplicates as i64,
                stats.written as i64,
                stats.outcome.as_str(),
                stats.error,
                run_id
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn latest_runs(&self) -> Result<Vec<SyncRunRecord>, StateError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT tenant_id, started_at, completed_at, fetched, skipped_duplicates, written, outcome, error
                FROM sync_runs
                WHERE id IN (SELECT MAX(id) FROM sync_runs GROUP BY tenant_id)
                ORDER BY tenant_id
                "#,
            )
            .map_err(StateError::query)?;

        let records = stmt
            .query_map([], |row| Ok(row_to_sync_run(row)))
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(records)
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

fn row_to_sync_run(row: &rusqlite::Row<'_>) -> SyncRunRecord {
    let outcome: Option<String> = row.get(6).unwrap_or_default();
    SyncRunRecord {
        tenant_id: row.get(0).unwrap_or_default(),
        started_at: timestamp_to_datetime(row.get(1).unwrap_or_default()),
        completed_at: row
            .get::<_, Option<i64>>(2)
            .unwrap_or_default()
            .map(timestamp_to_datetime),
        fetched: row.get::<_, i64>(3).unwrap_or_default() as u64,
        skipped_duplicates: row.get::<_, i64>(4).unwrap_or_default() as u64,
        written: row.get::<_, i64>(5).unwrap_or_default() as u64,
        outcome: outcome.as_deref().and_then(RunOutcome::from_str),
        error: row.get(7).unwrap_or_default(),
    }
}
