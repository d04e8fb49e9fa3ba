//! Shared-secret gate for the HTTP transport

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::error::FmpError;
use crate::mcp::McpResponse;

/// Header carrying the gate secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameters accepted as the gate secret
const QUERY_KEY_PARAMS: &[&str] = &["key", "api_key"];

#[derive(Clone, Default)]
pub struct AuthGate {
    keys: Arc<Vec<String>>,
    protect_health: bool,
}

impl AuthGate {
    pub fn new(keys: Vec<String>, protect_health: bool) -> Self {
        Self {
            keys: Arc::new(keys.into_iter().filter(|k| !k.is_empty()).collect()),
            protect_health,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.app_api_keys.clone(), config.protect_health)
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Whether requests to `path` must present a key
    pub fn protects(&self, path: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        path.trim_end_matches('/') != "/health" || self.protect_health
    }

    /// Whether the request carries one of the configured keys
    pub fn check(&self, headers: &HeaderMap, query: Option<&str>) -> bool {
        match presented_key(headers, query) {
            Some(candidate) => self.matches(&candidate),
            None => false,
        }
    }

    /// Compare against every key without short-circuiting
    fn matches(&self, candidate: &str) -> bool {
        let mut found = subtle::Choice::from(0u8);
        for key in self.keys.iter() {
            found |= key.as_bytes().ct_eq(candidate.as_bytes());
        }
        found.into()
    }
}

/// Key from `x-api-key`, `authorization: Bearer`, or `?key=` / `?api_key=`
pub fn presented_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }

    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some((scheme, token)) = auth.trim().split_once(' ') {
            let token = token.trim();
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(name, value)| QUERY_KEY_PARAMS.contains(&name.as_ref()) && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

/// Middleware rejecting requests without a valid gate secret
pub async fn require_key(State(gate): State<AuthGate>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !gate.protects(&path) || gate.check(request.headers(), request.uri().query()) {
        return next.run(request).await;
    }

    tracing::warn!(path = %path, method = %request.method(), "rejected request without valid key");
    let body = if path.starts_with("/mcp") {
        serde_json::to_value(McpResponse::from_error(Value::Null, &FmpError::Unauthorized))
            .unwrap_or_else(|_| json!({ "error": "unauthorized" }))
    } else {
        json!({ "error": "unauthorized" })
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_presented_key_sources() {
        assert_eq!(
            presented_key(&headers(&[("x-api-key", "a")]), None).as_deref(),
            Some("a")
        );
        assert_eq!(
            presented_key(&headers(&[("authorization", "Bearer b")]), None).as_deref(),
            Some("b")
        );
        assert_eq!(
            presented_key(&HeaderMap::new(), Some("session_id=x&api_key=c")).as_deref(),
            Some("c")
        );
        assert_eq!(
            presented_key(&HeaderMap::new(), Some("key=d")).as_deref(),
            Some("d")
        );
        assert!(presented_key(&headers(&[("authorization", "Basic e")]), None).is_none());
    }

    #[test]
    fn test_open_gate_protects_nothing() {
        let gate = AuthGate::new(vec![], true);
        assert!(!gate.protects("/mcp"));
    }

    #[test]
    fn test_health_protection_is_opt_in() {
        let gate = AuthGate::new(vec!["s".into()], false);
        assert!(gate.protects("/mcp"));
        assert!(!gate.protects("/health"));
        assert!(AuthGate::new(vec!["s".into()], true).protects("/health"));
    }

    #[test]
    fn test_any_configured_key_matches() {
        let gate = AuthGate::new(vec!["first".into(), "second".into()], false);
        assert!(gate.check(&headers(&[("x-api-key", "second")]), None));
        assert!(!gate.check(&headers(&[("x-api-key", "secon")]), None));
        assert!(!gate.check(&HeaderMap::new(), None));
    }
}
