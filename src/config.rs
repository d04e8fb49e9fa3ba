//! Runtime configuration shared by the transports and the dispatcher

use std::time::Duration;

use url::Url;

use crate::error::{FmpError, Result};

/// Default FMP host
pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";

/// Documentation page scanned by catalog discovery
pub const DEFAULT_DOCS_URL: &str = "https://site.financialmodelingprep.com/developer/docs";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Upstream credential appended to every call that lacks one
    pub fmp_api_key: Option<String>,
    pub fmp_base_url: String,
    /// Gate secrets; empty means the gate is open
    pub app_api_keys: Vec<String>,
    pub protect_health: bool,
    pub request_timeout: Duration,
    /// Default TTL for cached GETs (zero disables caching)
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    /// Requests allowed per rate window (zero disables the limiter)
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub discovery: bool,
    pub docs_url: String,
    pub require_initialize: bool,
    /// Sessions idle longer than this are dropped (zero keeps them forever)
    pub session_idle: Duration,
    pub cors_allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            fmp_api_key: None,
            fmp_base_url: DEFAULT_BASE_URL.to_string(),
            app_api_keys: Vec::new(),
            protect_health: false,
            request_timeout: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(60),
            cache_max_entries: 1000,
            rate_limit: 0,
            rate_window: Duration::from_secs(60),
            discovery: false,
            docs_url: DEFAULT_DOCS_URL.to_string(),
            require_initialize: false,
            session_idle: Duration::from_secs(3600),
            cors_allow_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Check invariants that clap cannot express
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(FmpError::Config("request timeout must be positive".into()));
        }
        if self.rate_limit > 0 && self.rate_window.is_zero() {
            return Err(FmpError::Config("rate window must be positive".into()));
        }
        let base = Url::parse(&self.fmp_base_url)
            .map_err(|e| FmpError::Config(format!("invalid FMP base URL: {}", e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(FmpError::Config(format!(
                "FMP base URL must be http(s), got {}",
                base.scheme()
            )));
        }
        Ok(())
    }

    /// Whether the shared-secret gate is active
    pub fn gate_enabled(&self) -> bool {
        !self.app_api_keys.is_empty()
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
