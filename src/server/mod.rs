//! HTTP transport
//!
//! `/health`, and `/mcp` for JSON-RPC (POST), server-sent events (GET) and
//! session teardown (DELETE).

pub mod auth;
pub mod routes;

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Response, StatusCode},
    middleware,
    routing::get,
    Router,
};
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::AuthGate;
pub use routes::AppState;

use crate::config::Config;
use crate::error::{FmpError, Result};
use crate::mcp::{Dispatcher, McpResponse, SESSION_HEADER};

/// HTTP server
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    gate: AuthGate,
    cors_origins: Vec<String>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| FmpError::Config(format!("invalid listen address: {}", e)))?;
        Ok(Self {
            dispatcher,
            gate: AuthGate::from_config(config),
            cors_origins: config.cors_allow_origins.clone(),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the router
    pub fn router(dispatcher: Arc<Dispatcher>, gate: AuthGate, cors_origins: &[String]) -> Router {
        let state = AppState::new(dispatcher);
        let mcp = get(routes::sse_mcp)
            .post(routes::post_mcp)
            .delete(routes::delete_mcp);

        Router::new()
            .route("/health", get(routes::health))
            .route("/mcp", mcp.clone())
            .route("/mcp/", mcp)
            .fallback(routes::not_found)
            .with_state(state)
            .layer(middleware::from_fn_with_state(gate, auth::require_key))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(cors_origins))
    }

    pub fn app(&self) -> Router {
        Self::router(self.dispatcher.clone(), self.gate.clone(), &self.cors_origins)
    }

    /// Start the server; returns after ctrl-c
    pub async fn start(self) -> std::io::Result<()> {
        let app = self.app();

        tracing::info!(
            gate = self.gate.is_enabled(),
            "MCP HTTP server listening on {}",
            self.addr
        );

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// CORS for browser-based clients; an empty list or `*` allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(AnyOrigin)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    let session = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(auth::API_KEY_HEADER),
            session.clone(),
        ])
        .expose_headers([session])
        .max_age(Duration::from_secs(86_400))
}

/// JSON-RPC internal error for a panicking handler
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!("handler panicked: {}", detail);

    let reply = McpResponse::from_error(Value::Null, &FmpError::Internal(detail));
    let body = serde_json::to_string(&reply).unwrap_or_else(|_| {
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
            .to_string()
    });

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
