//! JSON-RPC method dispatch

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, ResourceDescriptor,
    ToolCallResult, ToolDescriptor,
};
use super::session::SessionStore;
use super::tools::ToolExecutor;
use crate::catalog::{schema, CatalogHandle};
use crate::error::{codes, FmpError, Result};
use crate::upstream::Upstream;

/// URI of the built-in help resource
pub const HELP_URI: &str = "help://fmp-universal";

const HELP_TEXT: &str = "\
FMP universal MCP server

1) Generic call: fmp.request {method?, path, params?, body?, headers?, paginate?}
   path accepts v3/..., v4/..., stable/..., api/... or a bare endpoint (served from /stable).
   The server API key is added as apikey unless you pass apikey, api_key, key or token.
2) Endpoint tools: fmp_* (one per curated endpoint, each with a plan hint).
3) Access checks: fmp.list_endpoints {run_check: true} and fmp.test_endpoint {service, endpoint}.
4) Research helpers: search {query} and fetch {id}.

Docs and pricing: https://site.financialmodelingprep.com/developer/docs
";

const INSTRUCTIONS: &str = "Use fmp.request for any Financial Modeling Prep endpoint, or the \
fmp_* tools for common ones. Read help://fmp-universal for path conventions.";

/// Routes MCP methods to the catalog and the upstream
pub struct Dispatcher {
    catalog: CatalogHandle,
    executor: ToolExecutor,
    sessions: Arc<dyn SessionStore>,
    require_initialize: bool,
}

impl Dispatcher {
    pub fn new(
        catalog: CatalogHandle,
        upstream: Arc<Upstream>,
        sessions: Arc<dyn SessionStore>,
        require_initialize: bool,
    ) -> Self {
        Self {
            catalog,
            executor: ToolExecutor::new(upstream),
            sessions,
            require_initialize,
        }
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn upstream(&self) -> &Upstream {
        self.executor.upstream()
    }

    async fn dispatch(&self, session_id: &str, request: &McpRequest) -> Result<Value> {
        let method = request.method.as_str();
        if self.require_initialize && needs_session(method) && !self.sessions.is_initialized(session_id)
        {
            return Err(FmpError::NotInitialized);
        }

        match method {
            methods::INITIALIZE => self.initialize(session_id, request),
            methods::INITIALIZED => Ok(Value::Null),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => self.list_tools(),
            methods::CALL_TOOL => self.call_tool(request.params_object()?).await,
            methods::LIST_RESOURCES => self.list_resources(),
            methods::READ_RESOURCE => self.read_resource(request.params_object()?),
            other if other.starts_with(methods::NOTIFICATION_PREFIX) => Ok(Value::Null),
            other => Err(FmpError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, session_id: &str, request: &McpRequest) -> Result<Value> {
        let params = request.params_object()?;
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        if let Some(client) = params.get("clientInfo") {
            tracing::info!(session = %session_id, client = %client, "client initialized");
        }
        self.sessions.mark_initialized(session_id);

        let mut result = InitializeResult::negotiate(requested);
        result.instructions = Some(INSTRUCTIONS.to_string());
        Ok(serde_json::to_value(result)?)
    }

    fn list_tools(&self) -> Result<Value> {
        let catalog = self.catalog.snapshot();
        let tools: Vec<ToolDescriptor> = catalog.tools().iter().map(ToolDescriptor::from).collect();
        Ok(json!({ "tools": tools }))
    }

    async fn call_tool(&self, params: Map<String, Value>) -> Result<Value> {
        let name = match params.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.as_str(),
            _ => return Err(FmpError::InvalidParams("tools/call requires a tool name".into())),
        };

        let catalog = self.catalog.snapshot();
        let tool = catalog
            .get(name)
            .ok_or_else(|| FmpError::UnknownTool(name.to_string()))?;

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let args = schema::validate(&tool.params, &arguments)?;

        tracing::debug!(tool = %name, "calling tool");
        let body = self.executor.execute(&catalog, tool, &args).await?;
        Ok(serde_json::to_value(ToolCallResult::json(&body)?)?)
    }

    fn list_resources(&self) -> Result<Value> {
        let help = ResourceDescriptor {
            uri: HELP_URI.to_string(),
            name: "FMP universal help".to_string(),
            description: "Path conventions and tool overview".to_string(),
            mime_type: "text/plain".to_string(),
        };
        Ok(json!({ "resources": [help] }))
    }

    fn read_resource(&self, params: Map<String, Value>) -> Result<Value> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| FmpError::InvalidParams("resources/read requires a uri".into()))?;
        if uri != HELP_URI {
            return Err(FmpError::InvalidParams(format!("unknown resource: {}", uri)));
        }
        Ok(json!({
            "contents": [{ "uri": HELP_URI, "mimeType": "text/plain", "text": HELP_TEXT }]
        }))
    }
}

/// Methods gated by the initialize-before-use policy
fn needs_session(method: &str) -> bool {
    method.starts_with("tools/") || method.starts_with("resources/")
}

#[async_trait]
impl McpHandler for Dispatcher {
    async fn handle_request(&self, session_id: &str, request: McpRequest) -> Option<McpResponse> {
        self.sessions.touch(session_id);
        let result = self.dispatch(session_id, &request).await;

        let Some(id) = request.id else {
            if let Err(e) = result {
                tracing::debug!(method = %request.method, "notification failed: {}", e);
            }
            return None;
        };

        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => {
                if e.code() == codes::INTERNAL_ERROR {
                    tracing::error!(method = %request.method, "request failed: {}", e);
                } else {
                    tracing::debug!(method = %request.method, "request rejected: {}", e);
                }
                McpResponse::from_error(id, &e)
            }
        })
    }
}
