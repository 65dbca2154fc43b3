use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use super::error::KsefError;

const DEFAULT_USER_AGENT: &str = concat!("ksef-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One gateway call, expressed relative to the API base URL.
#[derive(Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl std::fmt::Debug for GatewayRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl GatewayRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

/// Status code plus decoded body. Non-JSON bodies decode to `Value::Null`
/// and are kept verbatim in `text` for error messages.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
    pub text: String,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal async transport used by the authenticator and the retriever.
/// The production implementation is [`HttpTransport`]; tests script responses.
#[async_trait::async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, KsefError>;
}

/// `reqwest`-backed transport bound to one gateway base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KsefError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(KsefError::transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl GatewayTransport for HttpTransport {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, KsefError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        tracing::debug!("{:?} {}", request.method, request.path);
        let response = builder.send().await.map_err(KsefError::transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(KsefError::transport)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        tracing::debug!(status, path = %request.route(), "Gateway responded");

        Ok(GatewayResponse { status, body, text })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_strips_query() {
        let req = GatewayRequest::post("/invoices/query/metadata?pageSize=10&pageOffset=2", json!({}));
        assert_eq!(req.route(), "/invoices/query/metadata");
        let req = GatewayRequest::get("/security/public-key-certificates");
        assert_eq!(req.route(), "/security/public-key-certificates");
    }

    #[test]
    fn test_debug_redacts_bearer() {
        let req = GatewayRequest::get("/auth/REF").with_bearer("super-secret");
        let dbg = format!("{:?}", req);
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_response_success_range() {
        let ok = GatewayResponse {
            status: 202,
            body: Value::Null,
            text: String::new(),
        };
        assert!(ok.is_success());
        let bad = GatewayResponse {
            status: 400,
            body: Value::Null,
            text: String::new(),
        };
        assert!(!bad.is_success());
    }

    #[test]
    fn test_http_transport_trims_base_url() {
        let t = HttpTransport::new("https://api-test.ksef.mf.gov.pl/v2/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(t.base_url(), "https://api-test.ksef.mf.gov.pl/v2");
    }
}
