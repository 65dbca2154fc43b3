use chrono::DateTime;
use serde::Deserialize;

use crate::ksef::error::KsefError;

/// Response from `/auth/challenge`.
#[derive(Debug, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
    pub timestamp: String,
}

impl ChallengeResponse {
    /// Challenge timestamp in epoch milliseconds, as required in the token payload.
    pub fn timestamp_millis(&self) -> Result<i64, KsefError> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| {
                KsefError::Protocol(format!(
                    "Challenge timestamp '{}' is not ISO-8601: {e}",
                    self.timestamp
                ))
            })
    }
}

/// One entry of `/security/public-key-certificates`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCertificate {
    pub certificate: String,
    #[serde(default)]
    pub usage: Vec<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenHolder {
    #[serde(default)]
    pub token: Option<String>,
}

/// The gateway has returned tokens both as `{"token": "..."}` and as a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TokenField {
    Nested(TokenHolder),
    Plain(String),
}

impl TokenField {
    fn token(&self) -> Option<&str> {
        match self {
            TokenField::Nested(holder) => holder.token.as_deref(),
            TokenField::Plain(s) => Some(s.as_str()),
        }
        .filter(|t| !t.is_empty())
    }
}

/// Response from `/auth/ksef-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitTokenResponse {
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub authentication_token: Option<TokenField>,
    #[serde(default)]
    pub session_token: Option<TokenField>,
    #[serde(default)]
    pub token: Option<String>,
}

impl InitTokenResponse {
    pub fn initial_token(&self) -> Option<&str> {
        self.authentication_token
            .as_ref()
            .and_then(TokenField::token)
            .or_else(|| self.session_token.as_ref().and_then(TokenField::token))
            .or_else(|| self.token.as_deref().filter(|t| !t.is_empty()))
    }
}

/// Response from `/auth/{referenceNumber}`.
#[derive(Debug, Deserialize)]
pub struct AuthStatusResponse {
    #[serde(default)]
    pub status: Option<AuthStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AuthStatus {
    pub code: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Status code reported once the gateway has authorized the operation.
pub const STATUS_AUTHORIZED: i64 = 200;

/// Response from `/auth/token/redeem`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    #[serde(default)]
    pub access_token: Option<TokenField>,
    #[serde(default)]
    pub token: Option<String>,
}

impl RedeemResponse {
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .and_then(TokenField::token)
            .or_else(|| self.token.as_deref().filter(|t| !t.is_empty()))
    }
}
