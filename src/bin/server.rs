//! fmp-mcp MCP server
//!
//! Run with: fmp-mcp-server (HTTP) or fmp-mcp-server --stdio

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fmp_mcp::catalog::discovery::spawn_discovery;
use fmp_mcp::config::{split_list, Config, DEFAULT_BASE_URL, DEFAULT_DOCS_URL};
use fmp_mcp::mcp::session::new_session_id;
use fmp_mcp::mcp::McpServer;
use fmp_mcp::upstream::UpstreamClient;
use fmp_mcp::{build_dispatcher_with, CatalogHandle, HttpServer, InMemorySessionStore};

#[derive(Parser, Debug)]
#[command(name = "fmp-mcp-server")]
#[command(about = "MCP server for the Financial Modeling Prep API")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// FMP API key injected into upstream calls
    #[arg(long, env = "FMP_API_KEY", hide_env_values = true)]
    fmp_api_key: Option<String>,

    /// FMP base URL
    #[arg(long, env = "FMP_BASE_URL")]
    fmp_base_url: Option<String>,

    /// Older name for FMP_BASE_URL
    #[arg(long, env = "FMP_BASE", hide = true)]
    fmp_base: Option<String>,

    /// Gate secret clients must present
    #[arg(long, env = "APP_API_KEY", hide_env_values = true)]
    app_api_key: Option<String>,

    /// Additional gate secrets, comma-separated
    #[arg(long, env = "APP_API_KEYS", hide_env_values = true)]
    app_api_keys: Option<String>,

    /// Require the gate secret on /health too
    #[arg(long, env = "APP_PROTECT_HEALTH")]
    protect_health: bool,

    /// Upstream request timeout in seconds
    #[arg(long, env = "FMP_TIMEOUT_SECS", default_value = "20")]
    timeout_secs: u64,

    /// Default TTL for cached GET responses (0 = no caching)
    #[arg(long, env = "FMP_CACHE_TTL_SECS", default_value = "60")]
    cache_ttl_secs: u64,

    /// Maximum cached responses
    #[arg(long, env = "FMP_CACHE_MAX_ENTRIES", default_value = "1000")]
    cache_max_entries: usize,

    /// Upstream calls allowed per rate window (0 = unlimited)
    #[arg(long, env = "FMP_RATE_LIMIT", default_value = "0")]
    rate_limit: u32,

    /// Rate window in seconds
    #[arg(long, env = "FMP_RATE_WINDOW_SECS", default_value = "60")]
    rate_window_secs: u64,

    /// Discover extra endpoint tools from the FMP docs page at startup
    #[arg(long, env = "FMP_DISCOVERY")]
    discovery: bool,

    /// Documentation page scanned by discovery
    #[arg(long, env = "FMP_DOCS_URL", default_value = DEFAULT_DOCS_URL)]
    docs_url: String,

    /// Reject tools/* and resources/* before initialize
    #[arg(long, env = "MCP_REQUIRE_INITIALIZE")]
    require_initialize: bool,

    /// Drop sessions idle for this many seconds (0 = never)
    #[arg(long, env = "MCP_SESSION_IDLE_SECS", default_value = "3600")]
    session_idle_secs: u64,

    /// Allowed CORS origins, comma-separated ("*" = any)
    #[arg(long, env = "CORS_ALLOW_ORIGINS", default_value = "*")]
    cors_allow_origins: String,

    /// Serve MCP over stdin/stdout instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn to_config(&self) -> Config {
        let mut app_api_keys: Vec<String> = self.app_api_key.iter().cloned().collect();
        if let Some(list) = &self.app_api_keys {
            app_api_keys.extend(split_list(list));
        }
        app_api_keys.retain(|k| !k.trim().is_empty());
        app_api_keys.dedup();

        Config {
            host: self.host.clone(),
            port: self.port,
            fmp_api_key: self.fmp_api_key.clone().filter(|k| !k.trim().is_empty()),
            fmp_base_url: self
                .fmp_base_url
                .clone()
                .or_else(|| self.fmp_base.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            app_api_keys,
            protect_health: self.protect_health,
            request_timeout: Duration::from_secs(self.timeout_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_max_entries: self.cache_max_entries,
            rate_limit: self.rate_limit,
            rate_window: Duration::from_secs(self.rate_window_secs),
            discovery: self.discovery,
            docs_url: self.docs_url.clone(),
            require_initialize: self.require_initialize,
            session_idle: Duration::from_secs(self.session_idle_secs),
            cors_allow_origins: split_list(&self.cors_allow_origins),
        }
    }
}

fn init_logging(json: bool) {
    // stderr keeps stdout free for the stdio transport
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
        }))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = args.to_config();
    config.validate().context("invalid configuration")?;

    if config.fmp_api_key.is_none() {
        tracing::warn!("FMP_API_KEY is not set; upstream calls will go out without a key");
    }

    let sessions = Arc::new(InMemorySessionStore::new());
    let catalog = CatalogHandle::seeded();
    let dispatcher = Arc::new(
        build_dispatcher_with(&config, catalog.clone(), sessions.clone())
            .context("failed to build dispatcher")?,
    );
    tracing::info!(
        tools = catalog.snapshot().len(),
        base_url = %config.fmp_base_url,
        "catalog ready"
    );

    if config.discovery {
        let client = UpstreamClient::new(config.request_timeout)?;
        spawn_discovery(catalog.clone(), client, config.docs_url.clone());
    }

    if !config.session_idle.is_zero() {
        let idle = config.session_idle;
        let store = sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle.min(Duration::from_secs(300)));
            loop {
                ticker.tick().await;
                let pruned = store.prune_idle(idle);
                if pruned > 0 {
                    tracing::debug!(pruned, "dropped idle sessions");
                }
            }
        });
    }

    if args.stdio {
        tracing::info!("serving MCP over stdio");
        McpServer::new(dispatcher, new_session_id()).run().await?;
    } else {
        HttpServer::new(dispatcher, &config)?.start().await?;
    }

    Ok(())
}
