//! Catalog discovery from the FMP documentation page
//!
//! The docs page is scanned for endpoint paths; each path not already covered
//! by a seed tool becomes a generic endpoint tool. The merged catalog replaces
//! the current snapshot in one swap. Any failure leaves the catalog untouched.

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::seed::{endpoint_common_params, seed_catalog};
use super::{CatalogHandle, ToolDefinition, ToolTarget};
use crate::error::{FmpError, Result};
use crate::upstream::{UpstreamClient, UpstreamRequest};

static ENDPOINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        /(stable|api/v3|api/v4)       # service prefix
        /([a-z][a-z0-9_\-]*           # first endpoint segment
        (?:/[A-Za-z0-9_\-]+)*)        # further segments
        ",
    )
    .unwrap()
});

/// Endpoint paths found in a documentation page, as (service, endpoint)
///
/// Trailing segments that look like ticker placeholders (`AAPL`) are dropped.
pub fn discover_paths(page: &str) -> BTreeSet<(String, String)> {
    let mut found = BTreeSet::new();
    for caps in ENDPOINT_PATTERN.captures_iter(page) {
        let service = match &caps[1] {
            "api/v3" => "v3",
            "api/v4" => "v4",
            _ => "stable",
        };
        let segments: Vec<&str> = caps[2]
            .split('/')
            .take_while(|s| !looks_like_symbol(s))
            .collect();
        if segments.is_empty() {
            continue;
        }
        found.insert((service.to_string(), segments.join("/")));
    }
    found
}

fn looks_like_symbol(segment: &str) -> bool {
    segment.is_empty()
        || segment
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '^')
}

/// Tool name for a discovered endpoint: `fmp_<endpoint>` for stable paths,
/// `fmp_v3_<endpoint>` for the legacy services
pub fn tool_name(service: &str, endpoint: &str) -> String {
    let slug: String = endpoint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    match service {
        "stable" => format!("fmp_{}", slug),
        other => format!("fmp_{}_{}", other, slug),
    }
}

pub fn discovered_tool(service: &str, endpoint: &str) -> ToolDefinition {
    let display_path = match service {
        "stable" => format!("/stable/{}", endpoint),
        other => format!("/api/{}/{}", other, endpoint),
    };
    ToolDefinition {
        name: tool_name(service, endpoint),
        title: format!("FMP {}", display_path),
        description: format!("Discovered FMP endpoint {}", display_path),
        target: ToolTarget::Endpoint {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
        },
        params: endpoint_common_params(),
        cache_ttl: None,
        plan_hint: None,
        category: Some("discovered".to_string()),
        probe: Vec::new(),
        discovered: true,
    }
}

/// Fetch the docs page once and swap in the merged catalog
///
/// Returns the number of discovered tools that made it into the catalog.
pub async fn refresh(
    handle: &CatalogHandle,
    client: &UpstreamClient,
    docs_url: &str,
) -> Result<usize> {
    let response = client.send(&UpstreamRequest::get(docs_url)).await?;
    if !response.ok {
        return Err(FmpError::Upstream(format!(
            "docs page returned status {}",
            response.status
        )));
    }
    let page = match response.data {
        Value::String(text) => text,
        other => other.to_string(),
    };

    let paths = discover_paths(&page);
    if paths.is_empty() {
        return Err(FmpError::Upstream("no endpoint paths found in docs page".into()));
    }

    let seed = seed_catalog();
    let covered: HashSet<(&str, &str)> = seed
        .tools()
        .iter()
        .filter_map(|t| match &t.target {
            ToolTarget::Endpoint { service, endpoint } => {
                Some((service.as_str(), endpoint.as_str()))
            }
            _ => None,
        })
        .collect();
    let extra: Vec<ToolDefinition> = paths
        .iter()
        .filter(|(service, endpoint)| !covered.contains(&(service.as_str(), endpoint.as_str())))
        .map(|(service, endpoint)| discovered_tool(service, endpoint))
        .collect();
    let catalog = seed.merged(extra);
    let added = catalog.tools().iter().filter(|t| t.discovered).count();
    handle.swap(catalog);
    Ok(added)
}

/// Run discovery in the background; the seed catalog serves meanwhile
pub fn spawn_discovery(
    handle: CatalogHandle,
    client: UpstreamClient,
    docs_url: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match refresh(&handle, &client, &docs_url).await {
            Ok(added) => tracing::info!(
                added,
                total = handle.snapshot().len(),
                "catalog discovery finished"
            ),
            Err(e) => tracing::warn!("catalog discovery failed, keeping seed catalog: {}", e),
        }
    })
}
