use crate::ksef::error::KsefError;

/// Credentials for one authenticated gateway session.
///
/// Lives for a single tenant's sync and is never persisted. The bearer
/// token is absent until the redeem step succeeds and cannot be replaced
/// afterwards.
pub struct SessionCredential {
    initial_token: String,
    reference_number: Option<String>,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("initial_token", &"<redacted>")
            .field("reference_number", &self.reference_number)
            .field("redeemed", &self.bearer_token.is_some())
            .finish()
    }
}

impl SessionCredential {
    pub(crate) fn new(initial_token: String, reference_number: Option<String>) -> Self {
        Self {
            initial_token,
            reference_number,
            bearer_token: None,
        }
    }

    pub fn initial_token(&self) -> &str {
        &self.initial_token
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn is_redeemed(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Store the final bearer token. Fails if one is already set.
    pub(crate) fn set_bearer_token(&mut self, token: String) -> Result<(), KsefError> {
        if self.bearer_token.is_some() {
            return Err(KsefError::Protocol(
                "Session already holds a redeemed bearer token".into(),
            ));
        }
        self.bearer_token = Some(token);
        Ok(())
    }

    /// The bearer token, or a protocol error if the session was never redeemed.
    pub fn require_bearer(&self) -> Result<&str, KsefError> {
        self.bearer_token()
            .ok_or_else(|| KsefError::Protocol("Session has not been redeemed".into()))
    }

    /// `Authorization` header value for calls made with this session.
    pub fn authorization_header(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}
