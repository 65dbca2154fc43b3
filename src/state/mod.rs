//! Persistent sync state.
//!
//! A SQLite database in the state directory holds:
//! - the backward-walk checkpoint of every backfill tenant
//! - a history of sync runs per tenant, shown by the `status` command
//!
//! Per-tenant lock files live next to it.

pub mod checkpoint;
pub mod db;
pub mod error;
pub mod lock;
pub mod schema;
pub mod types;

pub use checkpoint::{CheckpointStore, TenantCheckpoint};
pub use db::{SqliteStateDb, StateDb};
pub use lock::TenantLock;
pub use types::{format_checkpoint, RunOutcome, SyncRunStats};
