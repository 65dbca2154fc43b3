use thiserror::Error;

/// Errors raised while talking to the KSeF gateway.
///
/// The split that matters is [`KsefError::is_batch_fatal`]: most variants only
/// end the current tenant's sync, but a rate-limit breach or a rejected
/// credential must stop all traffic for the rest of the run, since repeated
/// attempts can get the taxpayer's token blocked by the gateway operator.
#[derive(Debug, Error)]
pub enum KsefError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Unexpected gateway response: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session not confirmed after {attempts} attempts during {stage}")]
    AuthTimeout { stage: &'static str, attempts: u32 },

    #[error("Gateway rate limit hit (HTTP 429) during {context}")]
    RateLimited { context: String },

    #[error("Gateway rejected credentials (HTTP {status}) during {context}; stopping to protect the token")]
    CredentialRevocationRisk { status: u16, context: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KsefError {
    /// Whether this error must halt the whole batch, not just one tenant.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            KsefError::RateLimited { .. } | KsefError::CredentialRevocationRisk { .. }
        )
    }

    pub(crate) fn transport(source: reqwest::Error) -> Self {
        Self::Transport(source.to_string())
    }

    /// Classify an HTTP status received on a call made with a bearer token.
    pub(crate) fn from_authenticated_status(status: u16, context: &str, body: &str) -> Self {
        match status {
            401 | 403 => Self::CredentialRevocationRisk {
                status,
                context: context.to_string(),
            },
            429 => Self::RateLimited {
                context: context.to_string(),
            },
            _ => Self::Protocol(format!("{context} returned HTTP {status}: {body}")),
        }
    }
}
