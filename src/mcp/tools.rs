//! Tool execution
//!
//! Every target resolves to one or more upstream calls; the result is a JSON
//! value that the dispatcher renders as the tool's text content.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Map, Value};

use super::args::{
    EndpointArgs, FetchArgs, ListEndpointsArgs, RequestArgs, SearchArgs, TestEndpointArgs,
};
use crate::catalog::{Catalog, ToolDefinition, ToolTarget};
use crate::error::{FmpError, Result};
use crate::upstream::{normalize_service_path, CallOutcome, Upstream, UpstreamCall};

/// Rows kept from a probed endpoint's response
pub const SAMPLE_ROWS: usize = 3;

const ACCESS_ERROR_CHARS: usize = 200;
const PROBE_ERROR_CHARS: usize = 500;
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(300);

/// Runs catalog tools against the upstream
#[derive(Clone)]
pub struct ToolExecutor {
    upstream: Arc<Upstream>,
}

impl ToolExecutor {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self { upstream }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Execute a tool with arguments that passed schema validation
    pub async fn execute(
        &self,
        catalog: &Catalog,
        tool: &ToolDefinition,
        args: &Map<String, Value>,
    ) -> Result<Value> {
        match &tool.target {
            ToolTarget::Request => self.request(tool, RequestArgs::from_args(args)?).await,
            ToolTarget::Endpoint { service, endpoint } => {
                let args = EndpointArgs::from_args(&tool.params, args)?;
                self.endpoint(tool, service, endpoint, args).await
            }
            ToolTarget::ListEndpoints => {
                self.list_endpoints(catalog, ListEndpointsArgs::from_args(args)?)
                    .await
            }
            ToolTarget::TestEndpoint => {
                self.test_endpoint(TestEndpointArgs::from_args(args)?).await
            }
            ToolTarget::Search => self.search(SearchArgs::from_args(args)?).await,
            ToolTarget::Fetch => self.fetch(FetchArgs::from_args(args)?).await,
        }
    }

    async fn request(&self, tool: &ToolDefinition, args: RequestArgs) -> Result<Value> {
        let call = UpstreamCall {
            method: args.method,
            path: args.path,
            params: args.params,
            headers: args.headers,
            body: args.body,
            cache_ttl: tool.cache_ttl,
        };
        let outcome = match &args.pagination {
            Some(pagination) => self.upstream.call_paginated(&call, pagination).await?,
            None => self.upstream.call(&call).await?,
        };
        Ok(report(&tool.name, &outcome))
    }

    async fn endpoint(
        &self,
        tool: &ToolDefinition,
        service: &str,
        endpoint: &str,
        args: EndpointArgs,
    ) -> Result<Value> {
        let call = UpstreamCall {
            cache_ttl: tool.cache_ttl,
            ..UpstreamCall::get(normalize_service_path(service, endpoint), args.params)
        };
        let outcome = match &args.pagination {
            Some(pagination) => self.upstream.call_paginated(&call, pagination).await?,
            None => self.upstream.call(&call).await?,
        };
        Ok(report(&tool.name, &outcome))
    }

    async fn list_endpoints(&self, catalog: &Catalog, args: ListEndpointsArgs) -> Result<Value> {
        let listed: Vec<&ToolDefinition> = catalog
            .tools()
            .iter()
            .filter(|t| matches!(t.target, ToolTarget::Endpoint { .. }))
            .filter(|t| match (&args.category, &t.category) {
                (Some(wanted), Some(category)) => wanted.eq_ignore_ascii_case(category),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();

        let mut rows: Vec<Value> = listed.iter().map(|t| endpoint_row(t)).collect();

        if args.run_check {
            tracing::info!(endpoints = listed.len(), "probing endpoint access");
            let checks = join_all(listed.iter().map(|t| self.check_access(t))).await;
            for (row, access) in rows.iter_mut().zip(checks) {
                if let Value::Object(row) = row {
                    row.insert("access".into(), access);
                }
            }
        }

        Ok(Value::Array(rows))
    }

    async fn check_access(&self, tool: &ToolDefinition) -> Value {
        let ToolTarget::Endpoint { service, endpoint } = &tool.target else {
            return json!({ "ok": false, "error": "not an endpoint tool" });
        };
        let params: Map<String, Value> = tool
            .probe
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let call = UpstreamCall {
            cache_ttl: Some(Duration::ZERO),
            ..UpstreamCall::get(normalize_service_path(service, endpoint), params)
        };
        match self.upstream.call(&call).await {
            Ok(outcome) if outcome.response.ok => {
                json!({ "ok": true, "status": outcome.response.status, "error": null })
            }
            Ok(outcome) => json!({
                "ok": false,
                "status": outcome.response.status,
                "error": truncate(&error_text(&outcome.response.data), ACCESS_ERROR_CHARS),
            }),
            Err(e) => json!({
                "ok": false,
                "status": null,
                "error": truncate(&e.to_string(), ACCESS_ERROR_CHARS),
            }),
        }
    }

    async fn test_endpoint(&self, args: TestEndpointArgs) -> Result<Value> {
        let call = UpstreamCall {
            cache_ttl: Some(Duration::ZERO),
            ..UpstreamCall::get(
                normalize_service_path(&args.service, &args.endpoint),
                args.params,
            )
        };
        match self.upstream.call(&call).await {
            Ok(outcome) if outcome.response.ok => Ok(json!({
                "ok": true,
                "status": outcome.response.status,
                "url": outcome.url,
                "sample": sample(&outcome.response.data),
            })),
            Ok(outcome) => Ok(json!({
                "ok": false,
                "status": outcome.response.status,
                "url": outcome.url,
                "error": truncate(&error_text(&outcome.response.data), PROBE_ERROR_CHARS),
            })),
            Err(e @ FmpError::InvalidParams(_)) => Err(e),
            Err(e) => Ok(json!({
                "ok": false,
                "error": truncate(&e.to_string(), PROBE_ERROR_CHARS),
            })),
        }
    }

    async fn search(&self, args: SearchArgs) -> Result<Value> {
        let mut params = Map::new();
        params.insert("query".into(), Value::String(args.query));
        params.insert("limit".into(), Value::from(args.limit));
        let call = UpstreamCall {
            cache_ttl: Some(SEARCH_CACHE_TTL),
            ..UpstreamCall::get("stable/search-name", params)
        };
        let outcome = self.upstream.call(&call).await?;
        if !outcome.response.ok {
            return Err(FmpError::Upstream(format!(
                "search-name returned status {}",
                outcome.response.status
            )));
        }

        let mut results = Vec::new();
        for row in outcome.response.data.as_array().into_iter().flatten() {
            let Some(symbol) = field(row, &["symbol", "symbolName", "cik"]) else {
                continue;
            };
            let name = field(row, &["name", "companyName"]).unwrap_or_else(|| symbol.clone());
            results.push(json!({
                "id": symbol,
                "title": format!("{} ({})", name, symbol),
                "url": self.profile_url(&symbol)?,
            }));
        }

        Ok(json!({ "results": results }))
    }

    async fn fetch(&self, args: FetchArgs) -> Result<Value> {
        let symbol = args.id;
        let mut params = Map::new();
        params.insert("symbol".into(), Value::String(symbol.clone()));

        let profile_call = UpstreamCall::get("stable/profile", params.clone());
        let quote_call = UpstreamCall::get("stable/quote", params);
        let (profile, quote) = tokio::join!(
            self.upstream.call(&profile_call),
            self.upstream.call(&quote_call),
        );
        let profile = first_row(profile?);
        let quote = first_row(quote?);

        let name = profile
            .as_ref()
            .and_then(|p| field(p, &["companyName", "name"]))
            .unwrap_or_else(|| symbol.clone());
        let description = profile
            .as_ref()
            .and_then(|p| field(p, &["description"]))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "No description.".to_string());
        let price = quote
            .as_ref()
            .and_then(|q| q.get("price"))
            .filter(|p| !p.is_null())
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let text = format!(
            "Symbol: {}\nName: {}\nPrice: {}\n\n{}",
            symbol, name, price, description
        );

        Ok(json!({
            "id": symbol,
            "title": format!("{} ({})", name, symbol),
            "text": text,
            "url": self.profile_url(&symbol)?,
            "metadata": {
                "source": "FMP",
                "fetched_at": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            },
        }))
    }

    fn profile_url(&self, symbol: &str) -> Result<String> {
        let mut params = Map::new();
        params.insert("symbol".into(), Value::String(symbol.to_string()));
        self.upstream.urls().public_url("stable/profile", &params)
    }
}

/// Result body shared by the request and endpoint tools
pub fn report(tool: &str, outcome: &CallOutcome) -> Value {
    let mut body = json!({
        "tool": tool,
        "request": {
            "method": outcome.method,
            "url": outcome.url,
        },
        "response": outcome.response,
        "cached": outcome.cached,
    });
    if let (Some(pages), Value::Object(map)) = (outcome.pages, &mut body) {
        map.insert("pages".into(), Value::from(pages));
    }
    body
}

fn endpoint_row(tool: &ToolDefinition) -> Value {
    let (service, endpoint) = match &tool.target {
        ToolTarget::Endpoint { service, endpoint } => (service.as_str(), endpoint.as_str()),
        _ => ("", ""),
    };
    let test_params: Map<String, Value> = tool
        .probe
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    json!({
        "tool_name": tool.name,
        "service": service,
        "endpoint": endpoint,
        "description": tool.description,
        "plan_hint": tool.plan_hint,
        "category": tool.category,
        "discovered": tool.discovered,
        "test_params": test_params,
    })
}

/// First few rows of a list body, or the body itself
fn sample(data: &Value) -> Value {
    match data {
        Value::Array(items) if items.len() > SAMPLE_ROWS => {
            Value::Array(items[..SAMPLE_ROWS].to_vec())
        }
        other => other.clone(),
    }
}

/// First object of a successful list or object body
fn first_row(outcome: CallOutcome) -> Option<Value> {
    if !outcome.response.ok {
        return None;
    }
    match outcome.response.data {
        Value::Array(items) => items.into_iter().find(Value::is_object),
        row @ Value::Object(_) => Some(row),
        _ => None,
    }
}

fn field(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn error_text(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::seed::seed_catalog;
    use crate::upstream::{ResponseCache, UpstreamClient, UrlBuilder};
    use mockito::Matcher;

    fn executor(base: &str) -> ToolExecutor {
        ToolExecutor::new(Arc::new(Upstream::new(
            UrlBuilder::new(base, Some("server-key".into())).unwrap(),
            UpstreamClient::new(Duration::from_secs(5)).unwrap(),
            Some(ResponseCache::new(100)),
            None,
            Duration::from_secs(60),
        )))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_tool_reports_request_and_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stable/quote")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "AAPL".into()),
                Matcher::UrlEncoded("apikey".into(), "server-key".into()),
            ]))
            .with_body(r#"[{"symbol":"AAPL","price":189.5}]"#)
            .create_async()
            .await;

        let catalog = seed_catalog();
        let tool = catalog.get("fmp_quote").unwrap();
        let exec = executor(&server.url());
        let body = exec
            .execute(&catalog, tool, &args(json!({"symbol": "AAPL"})))
            .await
            .unwrap();

        assert_eq!(body["tool"], "fmp_quote");
        assert_eq!(body["request"]["method"], "GET");
        assert!(body["request"]["url"].as_str().unwrap().contains("apikey=***"));
        assert_eq!(body["response"]["status"], 200);
        assert_eq!(body["response"]["data"][0]["price"], 189.5);
    }

    #[tokio::test]
    async fn test_search_builds_results() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stable/search-name")
            .match_query(Matcher::UrlEncoded("query".into(), "apple".into()))
            .with_body(
                r#"[{"symbol":"AAPL","name":"Apple Inc."},{"name":"No symbol"},{"symbol":"APLE"}]"#,
            )
            .create_async()
            .await;

        let catalog = seed_catalog();
        let exec = executor(&server.url());
        let body = exec
            .execute(
                &catalog,
                catalog.get("search").unwrap(),
                &args(json!({"query": "apple", "limit": 5})),
            )
            .await
            .unwrap();

        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], "AAPL");
        assert_eq!(results[0]["title"], "Apple Inc. (AAPL)");
        assert_eq!(results[1]["title"], "APLE (APLE)");
        let url = results[0]["url"].as_str().unwrap();
        assert!(url.ends_with("/stable/profile?symbol=AAPL"));
        assert!(!url.contains("server-key"));
    }

    #[tokio::test]
    async fn test_fetch_combines_profile_and_quote() {
        let mut server = mockito::Server::new_async().await;
        let _p = server
            .mock("GET", "/stable/profile")
            .match_query(Matcher::UrlEncoded("symbol".into(), "MSFT".into()))
            .with_body(r#"[{"companyName":"Microsoft Corporation","description":"Software."}]"#)
            .create_async()
            .await;
        let _q = server
            .mock("GET", "/stable/quote")
            .match_query(Matcher::UrlEncoded("symbol".into(), "MSFT".into()))
            .with_status(402)
            .with_body("Premium endpoint")
            .create_async()
            .await;

        let catalog = seed_catalog();
        let exec = executor(&server.url());
        let doc = exec
            .execute(&catalog, catalog.get("fetch").unwrap(), &args(json!({"id": "msft"})))
            .await
            .unwrap();

        assert_eq!(doc["id"], "MSFT");
        assert_eq!(doc["title"], "Microsoft Corporation (MSFT)");
        let text = doc["text"].as_str().unwrap();
        assert!(text.contains("Price: N/A"));
        assert!(text.ends_with("Software."));
        assert_eq!(doc["metadata"]["source"], "FMP");
    }

    #[tokio::test]
    async fn test_test_endpoint_trims_sample() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/stock/list")
            .match_query(Matcher::Any)
            .with_body("[1,2,3,4,5]")
            .create_async()
            .await;

        let catalog = seed_catalog();
        let exec = executor(&server.url());
        let body = exec
            .execute(
                &catalog,
                catalog.get("fmp.test_endpoint").unwrap(),
                &args(json!({"service": "v3", "endpoint": "stock/list"})),
            )
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
        assert_eq!(body["sample"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_list_endpoints_with_access_check() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/stable/earnings-calendar")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;
        let _denied = server
            .mock("GET", Matcher::Regex("^/stable/(dividends|ipo)-calendar".into()))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"Error Message":"Restricted Endpoint"}"#)
            .create_async()
            .await;

        let catalog = seed_catalog();
        let exec = executor(&server.url());
        let rows = exec
            .execute(
                &catalog,
                catalog.get("fmp.list_endpoints").unwrap(),
                &args(json!({"category": "Calendars", "run_check": true})),
            )
            .await
            .unwrap();

        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        let earnings = rows
            .iter()
            .find(|r| r["endpoint"] == "earnings-calendar")
            .unwrap();
        assert_eq!(earnings["access"]["ok"], true);
        assert!(earnings["test_params"].is_object());
        assert!(earnings.get("default_params").is_none());
        let ipo = rows.iter().find(|r| r["endpoint"] == "ipo-calendar").unwrap();
        assert_eq!(ipo["access"]["ok"], false);
        assert!(ipo["access"]["error"].as_str().unwrap().contains("Restricted"));
    }

    #[test]
    fn test_sample_and_truncate() {
        assert_eq!(sample(&json!({"a": 1})), json!({"a": 1}));
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
