//! Upstream URL construction
//!
//! Normalizes logical FMP paths to their versioned form and injects the
//! server-side API key unless the caller already supplied one.

use serde_json::{Map, Value};
use url::Url;

use crate::error::{FmpError, Result};

/// Parameter names that count as an API key (compared case-insensitively)
pub const KEY_PARAM_NAMES: &[&str] = &["apikey", "api_key", "key", "token"];

/// Name used when injecting the server key
pub const INJECTED_KEY_PARAM: &str = "apikey";

/// Placeholder written over key values in logged or echoed URLs
pub const REDACTED: &str = "***";

/// Builds absolute FMP URLs
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base: Url,
    api_key: Option<String>,
}

impl UrlBuilder {
    /// Create a builder for the given base URL and optional server key
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| FmpError::Config(format!("invalid FMP base URL: {}", e)))?;
        Ok(Self {
            base,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the URL for a logical path and query parameters
    pub fn build(&self, path: &str, params: &Map<String, Value>) -> Result<String> {
        self.build_with(path, params, true)
    }

    /// Same as [`UrlBuilder::build`] but never injects the server key
    ///
    /// For links handed back to clients.
    pub fn public_url(&self, path: &str, params: &Map<String, Value>) -> Result<String> {
        self.build_with(path, params, false)
    }

    fn build_with(&self, path: &str, params: &Map<String, Value>, inject: bool) -> Result<String> {
        let path = path.trim();
        if path.is_empty() {
            return Err(FmpError::InvalidParams("path must not be empty".into()));
        }

        let mut url = if path.starts_with("http://") || path.starts_with("https://") {
            let absolute = Url::parse(path)
                .map_err(|e| FmpError::InvalidParams(format!("invalid URL {}: {}", path, e)))?;
            if absolute.host_str() != self.base.host_str()
                || absolute.scheme() != self.base.scheme()
                || absolute.port_or_known_default() != self.base.port_or_known_default()
            {
                return Err(FmpError::InvalidParams(format!(
                    "absolute URL must target {}",
                    self.base.host_str().unwrap_or_default()
                )));
            }
            absolute
        } else {
            let (path_only, inline_query) = match path.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (path, None),
            };
            let mut url = self.base.clone();
            url.set_path(&normalize_path(path_only));
            url.set_query(inline_query.filter(|q| !q.is_empty()));
            url
        };

        let caller_has_key = url
            .query_pairs()
            .any(|(name, _)| is_key_param(&name))
            || params.keys().any(|name| is_key_param(name));

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                if let Some(rendered) = render_param(value) {
                    query.append_pair(name, &rendered);
                }
            }
            if inject && !caller_has_key {
                if let Some(key) = &self.api_key {
                    query.append_pair(INJECTED_KEY_PARAM, key);
                }
            }
        }

        // query_pairs_mut leaves a dangling "?" when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.to_string())
    }
}

/// Whether a query parameter name carries an API key
pub fn is_key_param(name: &str) -> bool {
    KEY_PARAM_NAMES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Normalize a logical path to its versioned upstream form
///
/// `v3/quote/AAPL` becomes `/api/v3/quote/AAPL`, a bare endpoint such as
/// `quote` is served from `/stable/quote`, and rooted paths pass through.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        return path.to_string();
    }
    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (path, ""),
    };
    match head.to_ascii_lowercase().as_str() {
        "stable" | "api" if !rest.is_empty() => format!("/{}", path),
        "v3" | "v4" if !rest.is_empty() => format!("/api/{}", path),
        _ => format!("/stable/{}", path),
    }
}

/// Join a named service with a bare endpoint
pub fn normalize_service_path(service: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with('/')
        || endpoint.starts_with("http://")
        || endpoint.starts_with("https://")
    {
        return endpoint.to_string();
    }
    match service.trim().to_ascii_lowercase().as_str() {
        "v3" | "api" | "legacy" => format!("/api/v3/{}", endpoint),
        "v4" => format!("/api/v4/{}", endpoint),
        "raw" => format!("/{}", endpoint),
        _ => format!("/stable/{}", endpoint),
    }
}

/// Render a JSON parameter value as a query string value
fn render_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render_param)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Replace key-like query values so the URL can be logged or echoed
pub fn redact(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let value = if is_key_param(&k) {
                REDACTED.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}
