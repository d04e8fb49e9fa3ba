//! Outbound HTTP calls to FMP

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FmpError, Result};

/// Headers the client controls itself and never forwards
const HOP_BY_HOP: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
];

/// HTTP method accepted by the generic request tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = FmpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(FmpError::InvalidParams(format!(
                "unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Status, success flag and parsed body of an upstream reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub ok: bool,
    /// Parsed JSON, or the raw body as a string when it is not JSON
    pub data: Value,
}

/// A fully shaped outbound request
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// Thin wrapper around a shared reqwest client with a bounded timeout
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fmp-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FmpError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request; HTTP error statuses are returned, not raised
    pub async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(forwardable_headers(&request.headers)?);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        Ok(UpstreamResponse {
            status: status.as_u16(),
            ok: status.is_success(),
            data: parse_body(text),
        })
    }

    fn classify(&self, err: reqwest::Error) -> FmpError {
        if err.is_timeout() {
            FmpError::UpstreamTimeout(self.timeout.as_secs())
        } else {
            FmpError::Upstream(err.to_string())
        }
    }
}

/// Parse a body as JSON, falling back to the raw text
pub fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn forwardable_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FmpError::InvalidParams(format!("invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| FmpError::InvalidParams(format!("invalid value for header {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_json_or_text() {
        assert_eq!(parse_body("[1,2]".into()), json!([1, 2]));
        assert_eq!(parse_body("Limit Reach".into()), json!("Limit Reach"));
        assert_eq!(parse_body("   ".into()), Value::Null);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!(
            serde_json::from_value::<HttpMethod>(json!("GET")).unwrap(),
            HttpMethod::Get
        );
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = BTreeMap::new();
        headers.insert("Host".to_string(), "evil".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        let map = forwardable_headers(&headers).unwrap();
        assert!(map.get("host").is_none());
        assert_eq!(map.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            forwardable_headers(&headers),
            Err(FmpError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stable/quote")
            .with_status(403)
            .with_body(r#"{"Error Message":"Invalid API KEY"}"#)
            .create_async()
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .send(&UpstreamRequest::get(format!("{}/stable/quote", server.url())))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert!(!response.ok);
        assert_eq!(response.data["Error Message"], "Invalid API KEY");
    }

    #[tokio::test]
    async fn test_connection_failure_is_upstream_error() {
        let client = UpstreamClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .send(&UpstreamRequest::get("http://127.0.0.1:1/unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, FmpError::Upstream(_)));
    }
}
