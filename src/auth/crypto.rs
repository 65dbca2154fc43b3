//! KSeF token encryption: RSA-OAEP (SHA-256) over `token|timestamp_ms`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::ksef::error::KsefError;

/// Separator between the secret token and the challenge timestamp.
const PAYLOAD_SEPARATOR: char = '|';

/// Decode a base64 certificate as published by `/security/public-key-certificates`.
pub fn decode_certificate(certificate_b64: &str) -> Result<RsaPublicKey, KsefError> {
    let der = BASE64
        .decode(certificate_b64.trim())
        .map_err(|e| KsefError::Crypto(format!("Certificate is not valid base64: {e}")))?;
    parse_public_key(&der)
}

/// Extract the RSA public key from an X.509 DER certificate.
///
/// Falls back to reading the bytes as a bare SubjectPublicKeyInfo, which is
/// what some gateway mirrors publish instead of a full certificate.
pub fn parse_public_key(der: &[u8]) -> Result<RsaPublicKey, KsefError> {
    match Certificate::from_der(der) {
        Ok(cert) => {
            let spki = cert
                .tbs_certificate
                .subject_public_key_info
                .to_der()
                .map_err(|e| KsefError::Crypto(format!("Cannot re-encode certificate key: {e}")))?;
            RsaPublicKey::from_public_key_der(&spki)
                .map_err(|e| KsefError::Crypto(format!("Certificate key is not RSA: {e}")))
        }
        Err(cert_err) => RsaPublicKey::from_public_key_der(der).map_err(|key_err| {
            KsefError::Crypto(format!(
                "Not an X.509 certificate ({cert_err}) nor a public key ({key_err})"
            ))
        }),
    }
}

/// Encrypt `secret_token|timestamp_millis` and return it base64-encoded.
///
/// OAEP padding is randomized, so two calls with the same inputs produce
/// different ciphertexts that decrypt to the same payload.
pub fn encrypt_token(
    secret_token: &str,
    timestamp_millis: i64,
    public_key: &RsaPublicKey,
) -> Result<String, KsefError> {
    let payload = format!("{secret_token}{PAYLOAD_SEPARATOR}{timestamp_millis}");
    let encrypted = public_key
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            payload.as_bytes(),
        )
        .map_err(|e| KsefError::Crypto(format!("Token encryption failed: {e}")))?;
    Ok(BASE64.encode(encrypted))
}
