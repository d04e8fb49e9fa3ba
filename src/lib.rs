//! fmp-mcp - Financial Modeling Prep over the Model Context Protocol
//!
//! Exposes the FMP REST API as MCP tools over HTTP (JSON-RPC and SSE) or
//! stdio, with key injection, response caching and rate limiting.

pub mod catalog;
pub mod config;
pub mod error;
pub mod mcp;
pub mod server;
pub mod upstream;

use std::sync::Arc;

pub use catalog::{Catalog, CatalogHandle, ToolDefinition};
pub use config::Config;
pub use error::{FmpError, Result};
pub use mcp::{Dispatcher, InMemorySessionStore, SessionStore};
pub use server::HttpServer;
pub use upstream::Upstream;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire a dispatcher over the seed catalog and a fresh session store
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    build_dispatcher_with(config, CatalogHandle::seeded(), Arc::new(InMemorySessionStore::new()))
}

/// Wire a dispatcher with a caller-provided catalog and session store
pub fn build_dispatcher_with(
    config: &Config,
    catalog: CatalogHandle,
    sessions: Arc<dyn SessionStore>,
) -> Result<Dispatcher> {
    config.validate()?;
    let upstream = Upstream::from_config(config)?;
    Ok(Dispatcher::new(
        catalog,
        Arc::new(upstream),
        sessions,
        config.require_initialize,
    ))
}
