//! KSeF session establishment via an encrypted KSeF token.
//!
//! The flow is challenge → public key fetch → token encryption → init →
//! status confirmation → redeem. Only the redeem step yields the bearer
//! token used for invoice queries.

pub mod crypto;
pub mod endpoints;
pub mod responses;
pub mod session;

use std::time::Duration;

use serde_json::json;

use crate::ksef::error::KsefError;
use crate::ksef::transport::{GatewayRequest, GatewayResponse, GatewayTransport};
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

use self::responses::{
    AuthStatusResponse, ChallengeResponse, InitTokenResponse, PublicKeyCertificate,
    RedeemResponse, STATUS_AUTHORIZED,
};
use self::session::SessionCredential;

/// Gateway error code reported while the authentication operation is still
/// being processed.
const REDEEM_PROCESSING_CODE: &str = "21301";

/// Statuses on redeem that mean "not ready yet" rather than "rejected".
const REDEEM_RETRYABLE_STATUSES: [u16; 3] = [400, 429, 480];

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub status_poll_attempts: u32,
    pub status_poll_delay: Duration,
    pub redeem_retry: RetryConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            status_poll_attempts: 10,
            status_poll_delay: Duration::from_secs(2),
            redeem_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    ChallengeReceived,
    TokenInitiated,
    SessionConfirmed,
    Redeemed,
    Failed,
}

/// Outcome of one redeem attempt that did not produce a token.
enum RedeemFailure {
    NotReady(String),
    Fatal(KsefError),
}

impl std::fmt::Display for RedeemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedeemFailure::NotReady(reason) => write!(f, "session not ready: {reason}"),
            RedeemFailure::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// Runs the authentication state machine for one tenant.
pub struct Authenticator<'a> {
    transport: &'a dyn GatewayTransport,
    config: AuthConfig,
    state: AuthState,
}

impl<'a> Authenticator<'a> {
    pub fn new(transport: &'a dyn GatewayTransport, config: AuthConfig) -> Self {
        Self {
            transport,
            config,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn transition(&mut self, next: AuthState) {
        tracing::debug!(from = ?self.state, to = ?next, "Authentication state change");
        self.state = next;
    }

    /// Establish a session for `nip` using its long-lived KSeF token.
    pub async fn authenticate(
        &mut self,
        nip: &str,
        secret_token: &str,
    ) -> Result<SessionCredential, KsefError> {
        match self.run(nip, secret_token).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.transition(AuthState::Failed);
                Err(e)
            }
        }
    }

    async fn run(&mut self, nip: &str, secret_token: &str) -> Result<SessionCredential, KsefError> {
        let challenge = self.request_challenge(nip).await?;
        self.transition(AuthState::ChallengeReceived);

        let public_key = self.fetch_encryption_key().await?;
        let encrypted =
            crypto::encrypt_token(secret_token, challenge.timestamp_millis()?, &public_key)?;

        let mut session = self.init_session(nip, &challenge.challenge, &encrypted).await?;
        self.transition(AuthState::TokenInitiated);

        if let Some(reference) = session.reference_number().map(str::to_owned) {
            self.await_confirmation(&reference, session.initial_token())
                .await?;
        } else {
            tracing::debug!("No reference number returned; skipping status confirmation");
        }
        self.transition(AuthState::SessionConfirmed);

        let bearer = self.redeem(session.initial_token()).await?;
        session.set_bearer_token(bearer)?;
        self.transition(AuthState::Redeemed);

        tracing::info!("Authenticated with KSeF");
        Ok(session)
    }

    async fn request_challenge(&self, nip: &str) -> Result<ChallengeResponse, KsefError> {
        let body = json!({
            "contextIdentifier": {"type": "onip", "identifier": nip}
        });
        let response = self
            .transport
            .send(&GatewayRequest::post(endpoints::CHALLENGE, body))
            .await?;
        let response = expect_success(response, "challenge")?;
        Ok(serde_json::from_value(response.body)?)
    }

    async fn fetch_encryption_key(&self) -> Result<rsa::RsaPublicKey, KsefError> {
        let response = self
            .transport
            .send(&GatewayRequest::get(endpoints::PUBLIC_KEY_CERTIFICATES))
            .await?;
        let response = expect_success(response, "public key fetch")?;
        let certificates: Vec<PublicKeyCertificate> = serde_json::from_value(response.body)?;
        let certificate = certificates
            .iter()
            .find(|c| {
                c.usage
                    .iter()
                    .any(|u| u == endpoints::TOKEN_ENCRYPTION_USAGE)
            })
            .ok_or_else(|| {
                KsefError::Configuration(format!(
                    "Gateway publishes no certificate with usage {}",
                    endpoints::TOKEN_ENCRYPTION_USAGE
                ))
            })?;
        crypto::decode_certificate(&certificate.certificate)
    }

    async fn init_session(
        &self,
        nip: &str,
        challenge: &str,
        encrypted_token: &str,
    ) -> Result<SessionCredential, KsefError> {
        let body = json!({
            "challenge": challenge,
            "contextIdentifier": {"type": "Nip", "value": nip},
            "encryptedToken": encrypted_token,
        });
        let response = self
            .transport
            .send(&GatewayRequest::post(endpoints::INIT_TOKEN, body))
            .await?;
        let response = expect_success(response, "token init")?;
        let init: InitTokenResponse = serde_json::from_value(response.body)?;
        let initial = init
            .initial_token()
            .ok_or_else(|| KsefError::Protocol("Token init response carries no token".into()))?
            .to_string();
        Ok(SessionCredential::new(initial, init.reference_number))
    }

    /// Poll the authentication operation until the gateway reports it authorized.
    async fn await_confirmation(&self, reference: &str, initial: &str) -> Result<(), KsefError> {
        let attempts = self.config.status_poll_attempts.max(1);
        let request = GatewayRequest::get(endpoints::auth_status(reference)).with_bearer(initial);

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.status_poll_delay).await;
            }
            let response = match self.transport.send(&request).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(attempt, "Status poll failed: {}", e);
                    continue;
                }
            };
            if matches!(response.status, 401 | 403) {
                return Err(KsefError::CredentialRevocationRisk {
                    status: response.status,
                    context: "authentication status".into(),
                });
            }
            if !response.is_success() {
                tracing::warn!(attempt, status = response.status, "Status poll rejected");
                continue;
            }
            let status: AuthStatusResponse = match serde_json::from_value(response.body) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Unreadable status response");
                    continue;
                }
            };
            match status.status {
                Some(s) if s.code == STATUS_AUTHORIZED => {
                    tracing::debug!(attempt, "Authentication confirmed");
                    return Ok(());
                }
                Some(s) if s.code >= 400 => {
                    return Err(KsefError::Protocol(format!(
                        "Authentication rejected with status {}: {}",
                        s.code,
                        s.description.unwrap_or_default()
                    )));
                }
                Some(s) => tracing::debug!(attempt, code = s.code, "Authentication in progress"),
                None => tracing::debug!(attempt, "Status response without a status"),
            }
        }

        Err(KsefError::AuthTimeout {
            stage: "status confirmation",
            attempts,
        })
    }

    async fn redeem(&self, initial: &str) -> Result<String, KsefError> {
        let result = retry_with_backoff(
            &self.config.redeem_retry,
            |failure: &RedeemFailure| match failure {
                RedeemFailure::NotReady(_) => RetryAction::Retry,
                RedeemFailure::Fatal(_) => RetryAction::Abort,
            },
            || self.redeem_once(initial),
        )
        .await;

        result.map_err(|failure| match failure {
            RedeemFailure::NotReady(reason) => {
                tracing::warn!("Redeem still not ready after retries: {}", reason);
                KsefError::AuthTimeout {
                    stage: "redeem",
                    attempts: self.config.redeem_retry.max_attempts.max(1),
                }
            }
            RedeemFailure::Fatal(e) => e,
        })
    }

    async fn redeem_once(&self, initial: &str) -> Result<String, RedeemFailure> {
        let request = GatewayRequest::post(endpoints::REDEEM_TOKEN, json!({})).with_bearer(initial);
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| match e {
                KsefError::Transport(msg) => RedeemFailure::NotReady(msg),
                other => RedeemFailure::Fatal(other),
            })?;

        if matches!(response.status, 401 | 403) {
            return Err(RedeemFailure::Fatal(KsefError::CredentialRevocationRisk {
                status: response.status,
                context: "token redeem".into(),
            }));
        }
        if !response.is_success() {
            if is_redeem_not_ready(&response) {
                return Err(RedeemFailure::NotReady(format!("HTTP {}", response.status)));
            }
            return Err(RedeemFailure::Fatal(KsefError::Protocol(format!(
                "token redeem returned HTTP {}: {}",
                response.status, response.text
            ))));
        }

        let redeemed: RedeemResponse =
            serde_json::from_value(response.body).map_err(|e| RedeemFailure::Fatal(e.into()))?;
        redeemed
            .bearer_token()
            .map(str::to_owned)
            .ok_or_else(|| {
                RedeemFailure::Fatal(KsefError::Protocol(
                    "Redeem response carries no access token".into(),
                ))
            })
    }
}

fn is_redeem_not_ready(response: &GatewayResponse) -> bool {
    REDEEM_RETRYABLE_STATUSES.contains(&response.status)
        || response.text.contains(REDEEM_PROCESSING_CODE)
        || response.text.to_lowercase().contains("processing")
}

/// Unauthenticated calls: any non-2xx is a protocol error.
fn expect_success(response: GatewayResponse, context: &str) -> Result<GatewayResponse, KsefError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(KsefError::Protocol(format!(
            "{context} returned HTTP {}: {}",
            response.status, response.text
        )))
    }
}
