//! Built-in tool definitions

use std::time::Duration;

use serde_json::json;

use super::schema::{ParamKind, ParamSpec};
use super::{Catalog, ToolDefinition, ToolTarget};

/// Name of the generic request tool
pub const REQUEST_TOOL: &str = "fmp.request";

/// Underscore alias for clients that reject dots in tool names
pub const REQUEST_TOOL_ALIAS: &str = "fmp_request";

/// A curated FMP endpoint exposed as its own tool
pub struct EndpointSeed {
    pub name: &'static str,
    pub title: &'static str,
    pub service: &'static str,
    pub endpoint: &'static str,
    pub category: &'static str,
    pub plan_hint: &'static str,
    pub description: &'static str,
    /// (name, kind, required, description)
    pub params: &'static [(&'static str, ParamKind, bool, &'static str)],
    pub probe: &'static [(&'static str, &'static str)],
    pub cache_ttl_secs: u64,
}

const SYMBOL: (&str, ParamKind, bool, &str) =
    ("symbol", ParamKind::String, true, "Ticker symbol, e.g. AAPL");
const LIMIT: (&str, ParamKind, bool, &str) =
    ("limit", ParamKind::Integer, false, "Maximum number of rows");
const PERIOD: (&str, ParamKind, bool, &str) =
    ("period", ParamKind::String, false, "annual or quarter");
const FROM: (&str, ParamKind, bool, &str) = ("from", ParamKind::String, false, "Start date (YYYY-MM-DD)");
const TO: (&str, ParamKind, bool, &str) = ("to", ParamKind::String, false, "End date (YYYY-MM-DD)");

/// Curated endpoint tools
pub const ENDPOINT_TOOLS: &[EndpointSeed] = &[
    // Directory & search
    EndpointSeed {
        name: "fmp_search_name",
        title: "Search by company name",
        service: "stable",
        endpoint: "search-name",
        category: "search",
        plan_hint: "Basic(EOD)",
        description: "Find ticker symbols by company name",
        params: &[
            ("query", ParamKind::String, true, "Company name or fragment"),
            LIMIT,
            ("exchange", ParamKind::String, false, "Restrict to an exchange, e.g. NASDAQ"),
        ],
        probe: &[("query", "Apple"), ("limit", "1")],
        cache_ttl_secs: 300,
    },
    EndpointSeed {
        name: "fmp_search",
        title: "Search symbols",
        service: "stable",
        endpoint: "search-symbol",
        category: "search",
        plan_hint: "Basic(EOD)",
        description: "Search by symbol, name, ISIN, CIK or CUSIP",
        params: &[("query", ParamKind::String, true, "Search text"), LIMIT],
        probe: &[("query", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 300,
    },
    EndpointSeed {
        name: "fmp_available_industries",
        title: "Available industries",
        service: "stable",
        endpoint: "available-industries",
        category: "search",
        plan_hint: "Basic(EOD)",
        description: "List of industries known to FMP",
        params: &[],
        probe: &[],
        cache_ttl_secs: 3600,
    },
    // Quotes & prices
    EndpointSeed {
        name: "fmp_quote",
        title: "Real-time quote",
        service: "stable",
        endpoint: "quote",
        category: "quotes",
        plan_hint: "Starter+",
        description: "Real-time quote for one or more symbols",
        params: &[SYMBOL],
        probe: &[("symbol", "AAPL")],
        cache_ttl_secs: 15,
    },
    EndpointSeed {
        name: "fmp_quote_short",
        title: "Short quote",
        service: "stable",
        endpoint: "quote-short",
        category: "quotes",
        plan_hint: "Basic(EOD)",
        description: "Compact quote: price, change and volume",
        params: &[SYMBOL],
        probe: &[("symbol", "AAPL")],
        cache_ttl_secs: 15,
    },
    EndpointSeed {
        name: "fmp_historical_price_full",
        title: "End-of-day price history",
        service: "stable",
        endpoint: "historical-price-eod/full",
        category: "quotes",
        plan_hint: "Basic(EOD)",
        description: "Full end-of-day OHLCV history",
        params: &[SYMBOL, FROM, TO],
        probe: &[("symbol", "AAPL"), ("from", "2023-01-01"), ("to", "2023-02-01")],
        cache_ttl_secs: 600,
    },
    EndpointSeed {
        name: "fmp_historical_price_eod_light",
        title: "End-of-day price history (light)",
        service: "stable",
        endpoint: "historical-price-eod/light",
        category: "quotes",
        plan_hint: "Basic(EOD)",
        description: "Lightweight end-of-day price history",
        params: &[SYMBOL, FROM, TO],
        probe: &[("symbol", "AAPL"), ("from", "2024-01-01"), ("to", "2024-02-01")],
        cache_ttl_secs: 600,
    },
    // Fundamentals
    EndpointSeed {
        name: "fmp_income_statement",
        title: "Income statement",
        service: "stable",
        endpoint: "income-statement",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Income statement (annual or quarterly)",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_balance_sheet_statement",
        title: "Balance sheet",
        service: "stable",
        endpoint: "balance-sheet-statement",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Balance sheet statement (annual or quarterly)",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_cash_flow_statement",
        title: "Cash flow statement",
        service: "stable",
        endpoint: "cash-flow-statement",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Cash flow statement (annual or quarterly)",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_financial_statement_full_as_reported",
        title: "Full statements as reported",
        service: "stable",
        endpoint: "financial-statement-full-as-reported",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "All financial statements as reported to the SEC",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("period", "annual"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_cash_flow_statement_as_reported",
        title: "Cash flow as reported",
        service: "stable",
        endpoint: "cash-flow-statement-as-reported",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Cash flow statement as reported",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("period", "annual"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_balance_sheet_statement_as_reported",
        title: "Balance sheet as reported",
        service: "stable",
        endpoint: "balance-sheet-statement-as-reported",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Balance sheet statement as reported",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("period", "annual"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_key_metrics",
        title: "Key metrics",
        service: "stable",
        endpoint: "key-metrics",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Valuation, growth and profitability metrics",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_ratios",
        title: "Financial ratios",
        service: "stable",
        endpoint: "ratios",
        category: "fundamentals",
        plan_hint: "Starter+",
        description: "Financial ratios",
        params: &[SYMBOL, PERIOD, LIMIT],
        probe: &[("symbol", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 3600,
    },
    // Profiles & reference
    EndpointSeed {
        name: "fmp_profile_symbol",
        title: "Company profile",
        service: "stable",
        endpoint: "profile",
        category: "profiles",
        plan_hint: "Starter+",
        description: "Company profile by symbol",
        params: &[SYMBOL],
        probe: &[("symbol", "AAPL")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_profile_bulk",
        title: "Bulk company profiles",
        service: "stable",
        endpoint: "profile-bulk",
        category: "profiles",
        plan_hint: "Starter+",
        description: "Bulk company profiles, split into parts",
        params: &[("part", ParamKind::Integer, true, "Part number, starting at 0")],
        probe: &[("part", "0")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_profile_cik",
        title: "Company profile by CIK",
        service: "stable",
        endpoint: "profile-cik",
        category: "profiles",
        plan_hint: "Starter+",
        description: "Company profile by SEC CIK",
        params: &[("cik", ParamKind::String, true, "SEC Central Index Key")],
        probe: &[("cik", "0000320193")],
        cache_ttl_secs: 3600,
    },
    EndpointSeed {
        name: "fmp_sec_profile",
        title: "SEC company profile",
        service: "stable",
        endpoint: "sec-profile",
        category: "profiles",
        plan_hint: "Starter+",
        description: "Detailed company profile from SEC filings",
        params: &[SYMBOL],
        probe: &[("symbol", "AAPL")],
        cache_ttl_secs: 3600,
    },
    // Calendars
    EndpointSeed {
        name: "fmp_earnings_calendar",
        title: "Earnings calendar",
        service: "stable",
        endpoint: "earnings-calendar",
        category: "calendars",
        plan_hint: "Starter+",
        description: "Upcoming and past earnings announcements",
        params: &[FROM, TO],
        probe: &[("from", "2025-01-01"), ("to", "2025-01-31")],
        cache_ttl_secs: 600,
    },
    EndpointSeed {
        name: "fmp_dividends_calendar",
        title: "Dividends calendar",
        service: "stable",
        endpoint: "dividends-calendar",
        category: "calendars",
        plan_hint: "Starter+",
        description: "Dividend events",
        params: &[FROM, TO],
        probe: &[("from", "2025-01-01"), ("to", "2025-01-31")],
        cache_ttl_secs: 600,
    },
    EndpointSeed {
        name: "fmp_ipo_calendar",
        title: "IPO calendar",
        service: "stable",
        endpoint: "ipo-calendar",
        category: "calendars",
        plan_hint: "Starter+",
        description: "Initial public offerings",
        params: &[FROM, TO],
        probe: &[("from", "2025-01-01"), ("to", "2025-01-31")],
        cache_ttl_secs: 600,
    },
    // News
    EndpointSeed {
        name: "fmp_stock_news",
        title: "Stock news",
        service: "stable",
        endpoint: "stock-news",
        category: "news",
        plan_hint: "Starter+",
        description: "Latest stock news",
        params: &[
            ("tickers", ParamKind::String, false, "Comma-separated symbols"),
            LIMIT,
        ],
        probe: &[("tickers", "AAPL"), ("limit", "1")],
        cache_ttl_secs: 120,
    },
    // Indexes
    EndpointSeed {
        name: "fmp_all_index_quotes",
        title: "All index quotes",
        service: "stable",
        endpoint: "all-index-quotes",
        category: "indexes",
        plan_hint: "Starter+",
        description: "Real-time quotes for all stock indexes",
        params: &[],
        probe: &[],
        cache_ttl_secs: 30,
    },
    EndpointSeed {
        name: "fmp_full_index_quotes",
        title: "Index quote detail",
        service: "stable",
        endpoint: "full-index-quotes",
        category: "indexes",
        plan_hint: "Starter+",
        description: "Detailed index quotes",
        params: &[("symbol", ParamKind::String, false, "Index symbol, e.g. ^GSPC")],
        probe: &[("symbol", "^GSPC")],
        cache_ttl_secs: 30,
    },
];

/// Parameters shared by every endpoint-style tool
pub fn endpoint_common_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("symbol", ParamKind::String, "Ticker symbol, e.g. AAPL"),
        ParamSpec::new("params", ParamKind::Object, "Extra query parameters"),
        ParamSpec::new("paginate", ParamKind::Boolean, "Fetch successive pages")
            .with_default(json!(false)),
        ParamSpec::new("page_param", ParamKind::String, "Name of the page parameter")
            .with_default(json!("page")),
        ParamSpec::new("start_page", ParamKind::Integer, "First page").with_default(json!(0)),
        ParamSpec::new("max_pages", ParamKind::Integer, "Page limit").with_default(json!(1)),
    ]
}

/// Combine endpoint-specific parameters with the shared ones
pub fn endpoint_params(specific: Vec<ParamSpec>) -> Vec<ParamSpec> {
    let mut params = specific;
    for common in endpoint_common_params() {
        if !params.iter().any(|p| p.name == common.name) {
            params.push(common);
        }
    }
    params
}

impl EndpointSeed {
    pub fn to_definition(&self) -> ToolDefinition {
        let specific = self
            .params
            .iter()
            .map(|(name, kind, required, description)| {
                let spec = ParamSpec::new(name, *kind, description);
                if *name == "period" {
                    let spec = spec.with_choices(&["annual", "quarter"]);
                    if *required {
                        spec.required()
                    } else {
                        spec
                    }
                } else if *required {
                    spec.required()
                } else {
                    spec
                }
            })
            .collect();

        ToolDefinition {
            name: self.name.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            target: ToolTarget::Endpoint {
                service: self.service.to_string(),
                endpoint: self.endpoint.to_string(),
            },
            params: endpoint_params(specific),
            cache_ttl: Some(Duration::from_secs(self.cache_ttl_secs)),
            plan_hint: Some(self.plan_hint.to_string()),
            category: Some(self.category.to_string()),
            probe: self
                .probe
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            discovered: false,
        }
    }
}

fn request_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::new("method", ParamKind::String, "HTTP method")
            .with_default(json!("GET"))
            .with_choices(&["GET", "POST", "PUT", "PATCH", "DELETE"]),
        ParamSpec::new(
            "path",
            ParamKind::String,
            "FMP path such as v3/quote/AAPL, stable/profile or quote",
        )
        .required(),
        ParamSpec::new("params", ParamKind::Object, "Query parameters"),
        ParamSpec::new("body", ParamKind::Object, "JSON body for non-GET requests"),
        ParamSpec::new("headers", ParamKind::Object, "Extra request headers"),
        ParamSpec::new("paginate", ParamKind::Boolean, "Fetch successive pages")
            .with_default(json!(false)),
        ParamSpec::new("page_param", ParamKind::String, "Name of the page parameter")
            .with_default(json!("page")),
        ParamSpec::new("start_page", ParamKind::Integer, "First page").with_default(json!(0)),
        ParamSpec::new("max_pages", ParamKind::Integer, "Page limit").with_default(json!(1)),
    ]
}

fn request_tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        title: "FMP request".to_string(),
        description: "Call any Financial Modeling Prep endpoint. The API key is added automatically."
            .to_string(),
        target: ToolTarget::Request,
        params: request_params(),
        cache_ttl: None,
        plan_hint: None,
        category: Some("generic".to_string()),
        probe: Vec::new(),
        discovered: false,
    }
}

fn builtin(
    name: &str,
    title: &str,
    description: &str,
    target: ToolTarget,
    params: Vec<ParamSpec>,
) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        target,
        params,
        cache_ttl: None,
        plan_hint: None,
        category: Some("builtin".to_string()),
        probe: Vec::new(),
        discovered: false,
    }
}

/// All seed tools in listing order
pub fn seed_tools() -> Vec<ToolDefinition> {
    let mut tools = vec![request_tool(REQUEST_TOOL), request_tool(REQUEST_TOOL_ALIAS)];
    tools.extend(ENDPOINT_TOOLS.iter().map(EndpointSeed::to_definition));
    tools.push(builtin(
        "fmp.list_endpoints",
        "List endpoint tools",
        "List the endpoint tools with their plan hints, optionally probing access with the configured key",
        ToolTarget::ListEndpoints,
        vec![
            ParamSpec::new("category", ParamKind::String, "Only list this category"),
            ParamSpec::new("run_check", ParamKind::Boolean, "Probe each endpoint")
                .with_default(json!(false)),
        ],
    ));
    tools.push(builtin(
        "fmp.test_endpoint",
        "Test endpoint access",
        "Probe one endpoint and return a small sample of its response",
        ToolTarget::TestEndpoint,
        vec![
            ParamSpec::new("service", ParamKind::String, "stable, v3, v4, api or raw")
                .with_default(json!("stable")),
            ParamSpec::new("endpoint", ParamKind::String, "Endpoint path").required(),
            ParamSpec::new("params", ParamKind::Object, "Query parameters"),
        ],
    ));
    tools.push(builtin(
        "search",
        "Search companies",
        "Search companies by name; returns a JSON object with a results array of {id, title, url}",
        ToolTarget::Search,
        vec![
            ParamSpec::new("query", ParamKind::String, "Company name").required(),
            ParamSpec::new("limit", ParamKind::Integer, "Maximum results").with_default(json!(5)),
        ],
    ));
    tools.push(builtin(
        "fetch",
        "Fetch company document",
        "Fetch a document for a symbol returned by search, built from profile and quote",
        ToolTarget::Fetch,
        vec![ParamSpec::new("id", ParamKind::String, "Ticker symbol from search results").required()],
    ));
    tools
}

/// The catalog served before discovery finishes
pub fn seed_catalog() -> Catalog {
    Catalog::new(seed_tools())
}
