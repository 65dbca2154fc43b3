//! Tenant registry: the list of businesses synced independently.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::ExecutionMode;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Cannot read tenants file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed tenants file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tenants file must hold a JSON array or an object with a \"tenants\" array")]
    Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
    /// NIP, also the gateway identity.
    pub tax_identifier: String,
    pub report_target: String,
    pub execution_mode: ExecutionMode,
    /// Carried for the report owner; never acted on.
    pub sharing_flag: bool,
}

impl Tenant {
    /// Name of the secret holding this tenant's KSeF token.
    pub fn secret_name(&self) -> String {
        format!("ksef-token-{}", self.tax_identifier)
    }
}

#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, RegistryError>;
}

#[derive(Debug, Deserialize)]
struct TenantEntry {
    id: Option<String>,
    #[serde(alias = "client_name")]
    display_name: Option<String>,
    #[serde(alias = "ksef_nip")]
    tax_identifier: Option<String>,
    /// Older spelling; `ksef_nip` wins when both are present.
    nip: Option<String>,
    #[serde(alias = "sheet_name")]
    report_target: Option<String>,
    #[serde(default)]
    execution_mode: ExecutionMode,
    #[serde(default, alias = "is_shared")]
    sharing_flag: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TenantEntry {
    fn into_tenant(self) -> Option<Tenant> {
        let tax_identifier = non_blank(self.tax_identifier).or_else(|| non_blank(self.nip))?;
        let report_target = non_blank(self.report_target)?;
        let id = non_blank(self.id).unwrap_or_else(|| tax_identifier.clone());
        Some(Tenant {
            display_name: non_blank(self.display_name).unwrap_or_else(|| id.clone()),
            id,
            tax_identifier,
            report_target,
            execution_mode: self.execution_mode,
            sharing_flag: self.sharing_flag,
        })
    }
}

/// Parse tenant definitions, skipping entries that cannot be processed.
pub fn parse_tenants(json: &str) -> Result<Vec<Tenant>, RegistryError> {
    let root: Value = serde_json::from_str(json)?;
    let entries = match root {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tenants") {
            Some(Value::Array(items)) => items,
            _ => return Err(RegistryError::Shape),
        },
        _ => return Err(RegistryError::Shape),
    };

    let mut tenants: Vec<Tenant> = Vec::with_capacity(entries.len());
    for (position, raw) in entries.into_iter().enumerate() {
        let label = raw
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{position}"));
        let entry: TenantEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tenant = %label, error = %e, "Skipping malformed tenant entry");
                continue;
            }
        };
        match entry.into_tenant() {
            Some(tenant) if tenants.iter().any(|t| t.id == tenant.id) => {
                tracing::warn!(tenant = %tenant.id, "Skipping tenant with duplicate id");
            }
            Some(tenant) => tenants.push(tenant),
            None => {
                tracing::warn!(tenant = %label, "Skipping invalid tenant: missing nip or report target");
            }
        }
    }
    Ok(tenants)
}

/// Tenants read from a JSON file on every call.
#[derive(Debug, Clone)]
pub struct JsonTenantRegistry {
    path: PathBuf,
}

impl JsonTenantRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TenantRegistry for JsonTenantRegistry {
    async fn list_tenants(&self) -> Result<Vec<Tenant>, RegistryError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RegistryError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_tenants(&text)
    }
}
