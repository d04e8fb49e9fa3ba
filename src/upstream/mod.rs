//! Upstream access to the FMP REST API
//!
//! [`Upstream`] ties together URL building, the optional response cache and
//! rate limiter, and the HTTP client.

pub mod cache;
pub mod client;
pub mod rate_limit;
pub mod url;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

pub use cache::{CacheStatsResponse, ResponseCache};
pub use client::{HttpMethod, UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use rate_limit::RateLimiter;
pub use self::url::{normalize_path, normalize_service_path, redact, UrlBuilder};

use crate::config::Config;
use crate::error::Result;

/// A logical call before URL construction
#[derive(Debug, Clone, Default)]
pub struct UpstreamCall {
    pub method: HttpMethod,
    pub path: String,
    pub params: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Overrides the default cache TTL for this call
    pub cache_ttl: Option<Duration>,
}

impl UpstreamCall {
    pub fn get(path: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            params,
            ..Self::default()
        }
    }
}

/// Page-walking options for list endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page_param: String,
    pub start_page: u64,
    pub max_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            start_page: 0,
            max_pages: 1,
        }
    }
}

/// What the dispatcher reports back for a completed call
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub method: HttpMethod,
    /// Request URL with key values redacted
    pub url: String,
    pub response: UpstreamResponse,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
}

/// Upstream facade shared by all requests
pub struct Upstream {
    urls: UrlBuilder,
    client: UpstreamClient,
    cache: Option<ResponseCache>,
    limiter: Option<RateLimiter>,
    default_ttl: Duration,
}

impl Upstream {
    pub fn new(
        urls: UrlBuilder,
        client: UpstreamClient,
        cache: Option<ResponseCache>,
        limiter: Option<RateLimiter>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            urls,
            client,
            cache,
            limiter,
            default_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let urls = UrlBuilder::new(&config.fmp_base_url, config.fmp_api_key.clone())?;
        let client = UpstreamClient::new(config.request_timeout)?;
        let cache = (!config.cache_ttl.is_zero())
            .then(|| ResponseCache::new(config.cache_max_entries));
        let limiter =
            (config.rate_limit > 0).then(|| RateLimiter::new(config.rate_limit, config.rate_window));
        Ok(Self::new(urls, client, cache, limiter, config.cache_ttl))
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    pub fn cache_stats(&self) -> Option<CacheStatsResponse> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Build, check cache, rate-limit and send a single call
    pub async fn call(&self, call: &UpstreamCall) -> Result<CallOutcome> {
        let url = self.urls.build(&call.path, &call.params)?;
        let redacted = redact(&url);
        let cacheable = call.method == HttpMethod::Get && call.body.is_none();

        if cacheable {
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&url)) {
                tracing::debug!(url = %redacted, "upstream cache hit");
                return Ok(CallOutcome {
                    method: call.method,
                    url: redacted,
                    response: hit,
                    cached: true,
                    pages: None,
                });
            }
        }

        if let Some(limiter) = &self.limiter {
            limiter.try_acquire()?;
        }

        tracing::debug!(method = %call.method, url = %redacted, "upstream request");
        let request = UpstreamRequest {
            method: call.method,
            url: url.clone(),
            headers: call.headers.clone(),
            body: call.body.clone(),
        };
        let response = match self.client.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %redacted, "upstream call failed: {}", e);
                return Err(e);
            }
        };

        if !response.ok {
            tracing::info!(url = %redacted, status = response.status, "upstream returned error status");
        }

        if cacheable && response.ok {
            if let Some(cache) = &self.cache {
                let ttl = call.cache_ttl.unwrap_or(self.default_ttl);
                cache.insert(url, response.clone(), ttl);
            }
        }

        Ok(CallOutcome {
            method: call.method,
            url: redacted,
            response,
            cached: false,
            pages: None,
        })
    }

    /// Walk pages sequentially, concatenating list bodies
    ///
    /// Stops at the first empty list, non-list body or error status.
    pub async fn call_paginated(
        &self,
        call: &UpstreamCall,
        pagination: &Pagination,
    ) -> Result<CallOutcome> {
        let mut rows: Vec<Value> = Vec::new();
        let mut last: Option<CallOutcome> = None;
        let mut pages = 0u32;

        for offset in 0..pagination.max_pages.max(1) {
            let mut page_call = call.clone();
            page_call.params.insert(
                pagination.page_param.clone(),
                Value::from(pagination.start_page + u64::from(offset)),
            );
            let outcome = self.call(&page_call).await?;
            pages += 1;

            let stop = match &outcome.response.data {
                _ if !outcome.response.ok => true,
                Value::Array(items) if items.is_empty() => true,
                Value::Array(items) => {
                    rows.extend(items.iter().cloned());
                    false
                }
                Value::Null => true,
                other => {
                    rows.push(other.clone());
                    true
                }
            };
            last = Some(outcome);
            if stop {
                break;
            }
        }

        // max_pages is at least one, so a page was fetched
        let Some(mut outcome) = last else {
            return Err(crate::error::FmpError::Internal("no page fetched".into()));
        };
        // A failing later page keeps the rows already collected
        if outcome.response.ok || !rows.is_empty() {
            outcome.response.data = Value::Array(rows);
        }
        outcome.pages = Some(pages);
        outcome.url = redact(&self.urls.build(&call.path, &call.params)?);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn upstream(base: &str, ttl: Duration, limit: u32) -> Upstream {
        Upstream::new(
            UrlBuilder::new(base, Some("server-key".into())).unwrap(),
            UpstreamClient::new(Duration::from_secs(5)).unwrap(),
            Some(ResponseCache::new(100)),
            (limit > 0).then(|| RateLimiter::new(limit, Duration::from_secs(60))),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_cached_get_skips_second_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/quote/AAPL")
            .match_query(Matcher::UrlEncoded("apikey".into(), "server-key".into()))
            .with_status(200)
            .with_body(r#"[{"symbol":"AAPL","price":123.45}]"#)
            .expect(1)
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::from_secs(60), 0);
        let call = UpstreamCall::get("v3/quote/AAPL", Map::new());
        let first = up.call(&call).await.unwrap();
        let second = up.call(&call).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.response, second.response);
        assert!(!first.url.contains("server-key"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/stable/quote")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .expect(2)
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::from_millis(20), 0);
        let call = UpstreamCall::get("quote", Map::new());
        up.call(&call).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let again = up.call(&call).await.unwrap();
        assert!(!again.cached);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_not_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/stable/quote")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::from_secs(60), 0);
        let call = UpstreamCall::get("quote", Map::new());
        let first = up.call(&call).await.unwrap();
        assert_eq!(first.response.status, 500);
        assert_eq!(first.response.data, json!("boom"));
        up.call(&call).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limiter_rejects_without_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/stable/quote")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::ZERO, 1);
        let call = UpstreamCall::get("quote", Map::new());
        up.call(&call).await.unwrap();
        let err = up.call(&call).await.unwrap_err();
        assert!(matches!(err, crate::error::FmpError::RateLimited(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pagination_concatenates_until_empty() {
        let mut server = mockito::Server::new_async().await;
        let p0 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::UrlEncoded("page".into(), "0".into()))
            .with_body(r#"[{"s":"A"},{"s":"B"}]"#)
            .create_async()
            .await;
        let p1 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(r#"[{"s":"C"}]"#)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body("[]")
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::ZERO, 0);
        let outcome = up
            .call_paginated(
                &UpstreamCall::get("stock-list", Map::new()),
                &Pagination {
                    max_pages: 5,
                    ..Pagination::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.pages, Some(3));
        assert_eq!(outcome.response.data, json!([{"s":"A"},{"s":"B"},{"s":"C"}]));
        p0.assert_async().await;
        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn test_pagination_keeps_rows_when_later_page_fails() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::UrlEncoded("page".into(), "0".into()))
            .with_body(r#"[{"s":"A"},{"s":"B"}]"#)
            .create_async()
            .await;
        let _p1 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(429)
            .with_body("Limit Reach")
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::ZERO, 0);
        let outcome = up
            .call_paginated(
                &UpstreamCall::get("stock-list", Map::new()),
                &Pagination {
                    max_pages: 5,
                    ..Pagination::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.pages, Some(2));
        assert_eq!(outcome.response.status, 429);
        assert!(!outcome.response.ok);
        assert_eq!(outcome.response.data, json!([{"s":"A"},{"s":"B"}]));
    }

    #[tokio::test]
    async fn test_pagination_first_page_failure_keeps_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = server
            .mock("GET", "/stable/stock-list")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("Invalid API KEY")
            .create_async()
            .await;

        let up = upstream(&server.url(), Duration::ZERO, 0);
        let outcome = up
            .call_paginated(
                &UpstreamCall::get("stock-list", Map::new()),
                &Pagination {
                    max_pages: 3,
                    ..Pagination::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.pages, Some(1));
        assert_eq!(outcome.response.status, 403);
        assert_eq!(outcome.response.data, json!("Invalid API KEY"));
    }
}
