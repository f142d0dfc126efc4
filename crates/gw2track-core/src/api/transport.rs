//! HTTP transport underneath [`ApiClient`](super::ApiClient).
//!
//! A transport performs exactly one GET and reports the raw status and body.
//! Retries, rate limiting and status interpretation live in the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

/// Base URL of the upstream v2 API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.guildwars2.com/v2";

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// One upstream GET: path relative to the API root, query pairs, optional bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub credential: Option<String>,
}

impl ApiRequest {
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request produced no response (connect failure, timeout, broken body).
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError>;
}

/// Where requests go and how the credential travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Straight to the API; credential in the `Authorization` header.
    Direct { base_url: String },
    /// Through the CORS bridge; path in `endpoint=`, credential in `apiKey=`.
    Proxied { proxy_url: String },
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Direct {
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Endpoint,
}

impl HttpTransport {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gw2track/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn build(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        match &self.endpoint {
            Endpoint::Direct { base_url } => {
                let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
                let builder = self.client.get(url).query(&request.query);
                match &request.credential {
                    Some(token) => builder.bearer_auth(token),
                    None => builder,
                }
            }
            Endpoint::Proxied { proxy_url } => {
                let mut query: Vec<(&str, &str)> = vec![("endpoint", request.path.as_str())];
                query.extend(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                if let Some(token) = &request.credential {
                    query.push(("apiKey", token.as_str()));
                }
                self.client.get(proxy_url).query(&query)
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError> {
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|e| TransportError(format!("GET {} failed: {}", request.path, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read body of {}: {}", request.path, e)))?;
        debug!(path = %request.path, status, bytes = body.len(), "Upstream response");

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(credential: Option<&str>) -> ApiRequest {
        ApiRequest {
            path: "/account/achievements".to_string(),
            query: vec![("ids".to_string(), "1,2".to_string())],
            credential: credential.map(str::to_string),
        }
    }

    #[test]
    fn test_direct_mode_uses_bearer_header() {
        let transport = HttpTransport::new(
            Endpoint::Direct {
                base_url: "https://api.example.test/v2/".to_string(),
            },
            Duration::from_secs(1),
        )
        .expect("client");
        let built = transport.build(&request(Some("KEY"))).build().expect("request");

        assert_eq!(
            built.url().as_str(),
            "https://api.example.test/v2/account/achievements?ids=1%2C2"
        );
        assert_eq!(
            built.headers().get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer KEY")
        );
    }

    #[test]
    fn test_proxied_mode_forwards_credential_as_query() {
        let transport = HttpTransport::new(
            Endpoint::Proxied {
                proxy_url: "https://tracker.example.test/api/gw2-proxy".to_string(),
            },
            Duration::from_secs(1),
        )
        .expect("client");
        let built = transport.build(&request(Some("KEY"))).build().expect("request");

        let pairs: Vec<(String, String)> = built
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("endpoint".to_string(), "/account/achievements".to_string()),
                ("ids".to_string(), "1,2".to_string()),
                ("apiKey".to_string(), "KEY".to_string()),
            ]
        );
        assert!(built.headers().get("authorization").is_none());
    }

    #[test]
    fn test_query_value_lookup() {
        let req = request(None);
        assert_eq!(req.query_value("ids"), Some("1,2"));
        assert_eq!(req.query_value("page"), None);
    }
}
