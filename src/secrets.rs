//! Secret lookup for per-tenant KSeF tokens.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Cannot read secrets file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Secrets file must be a JSON object of string values: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns `None` when the secret is absent or blank.
    async fn get_secret(&self, name: &str) -> Option<String>;
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variables first (`ksef-token-123` is read from
/// `KSEF_TOKEN_123`), then an optional JSON secrets file.
pub struct EnvSecretStore {
    file_secrets: HashMap<String, String>,
    env: EnvLookup,
}

impl std::fmt::Debug for EnvSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSecretStore")
            .field("file_secrets", &self.file_secrets.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub fn env_var_name(secret_name: &str) -> String {
    secret_name
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

impl EnvSecretStore {
    pub async fn load(secrets_file: Option<&Path>) -> Result<Self, SecretError> {
        let file_secrets = match secrets_file {
            Some(path) => {
                let text =
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|source| SecretError::Io {
                            path: path.to_path_buf(),
                            source,
                        })?;
                let secrets: HashMap<String, String> = serde_json::from_str(&text)?;
                tracing::debug!(path = %path.display(), count = secrets.len(), "Loaded secrets file");
                secrets
            }
            None => HashMap::new(),
        };
        Ok(Self {
            file_secrets,
            env: Box::new(|key| std::env::var(key).ok()),
        })
    }

    #[cfg(test)]
    fn with_env(
        file_secrets: HashMap<String, String>,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            file_secrets,
            env: Box::new(env),
        }
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Option<String> {
        (self.env)(&env_var_name(name))
            .or_else(|| self.file_secrets.get(name).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
