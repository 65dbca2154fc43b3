use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::db::StateDb;
use super::error::StateError;

/// Persists the oldest boundary a backward walk has fully processed.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, boundary: DateTime<Utc>) -> Result<(), StateError>;
    async fn load(&self) -> Result<Option<DateTime<Utc>>, StateError>;
    async fn clear(&self) -> Result<(), StateError>;
}

/// A tenant's checkpoint inside the shared state database.
pub struct TenantCheckpoint {
    db: Arc<dyn StateDb>,
    tenant_id: String,
}

impl TenantCheckpoint {
    pub fn new(db: Arc<dyn StateDb>, tenant_id: impl Into<String>) -> Self {
        Self {
            db,
            tenant_id: tenant_id.into(),
        }
    }
}

#[async_trait]
impl CheckpointStore for TenantCheckpoint {
    async fn save(&self, boundary: DateTime<Utc>) -> Result<(), StateError> {
        tracing::debug!(tenant = %self.tenant_id, %boundary, "Saving checkpoint");
        self.db.save_checkpoint(&self.tenant_id, boundary).await
    }

    async fn load(&self) -> Result<Option<DateTime<Utc>>, StateError> {
        self.db.load_checkpoint(&self.tenant_id).await
    }

    async fn clear(&self) -> Result<(), StateError> {
        if self.db.clear_checkpoint(&self.tenant_id).await? {
            tracing::info!(tenant = %self.tenant_id, "Checkpoint cleared");
        }
        Ok(())
    }
}
