//! Base URLs and routes of the KSeF v2 API.
//! Supports the "test", "demo" and "prod" gateway environments.

use crate::types::Environment;

pub const CHALLENGE: &str = "/auth/challenge";
pub const PUBLIC_KEY_CERTIFICATES: &str = "/security/public-key-certificates";
pub const INIT_TOKEN: &str = "/auth/ksef-token";
pub const REDEEM_TOKEN: &str = "/auth/token/redeem";
pub const QUERY_METADATA: &str = "/invoices/query/metadata";

/// Certificate usage tag marking the key used for token encryption.
pub const TOKEN_ENCRYPTION_USAGE: &str = "KsefTokenEncryption";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub base_url: String,
}

impl Endpoints {
    /// Returns the endpoints for the given environment, unless an explicit
    /// base URL overrides it.
    pub fn for_environment(environment: Environment, override_url: Option<&str>) -> Self {
        let base_url = match override_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match environment {
                Environment::Test => "https://api-test.ksef.mf.gov.pl/v2",
                Environment::Demo => "https://api-demo.ksef.mf.gov.pl/v2",
                Environment::Prod => "https://api.ksef.mf.gov.pl/v2",
            }
            .to_string(),
        };
        Self { base_url }
    }
}

/// Route polled while the gateway confirms an authentication operation.
pub fn auth_status(reference_number: &str) -> String {
    format!("/auth/{reference_number}")
}

/// Metadata query route for one page.
pub fn query_page(page_size: u32, page_offset: u64) -> String {
    format!("{QUERY_METADATA}?pageSize={page_size}&pageOffset={page_offset}")
}
