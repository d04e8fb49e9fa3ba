//! MCP JSON-RPC protocol types and the stdio transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{FmpError, Result};

/// Protocol version offered when the client does not ask for a known one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions this server accepts from clients
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// MCP JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl McpRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validate a raw envelope
    ///
    /// An `id` key holding `null` still makes a request, not a notification.
    pub fn from_value(value: Value) -> std::result::Result<Self, McpResponse> {
        let Value::Object(mut obj) = value else {
            return Err(McpResponse::from_error(
                Value::Null,
                &FmpError::BadRequest("request must be a JSON object".into()),
            ));
        };

        let id = obj.remove("id");
        let reply_id = id.clone().unwrap_or(Value::Null);
        let invalid = |msg: &str| {
            McpResponse::from_error(reply_id.clone(), &FmpError::BadRequest(msg.to_string()))
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(invalid("jsonrpc must be \"2.0\""));
        }
        if matches!(id, Some(Value::Object(_)) | Some(Value::Array(_))) {
            return Err(invalid("id must be a string, number or null"));
        }
        let method = match obj.remove("method") {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => return Err(invalid("method must be a non-empty string")),
        };

        Ok(Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        })
    }

    /// `params` as an object; null means empty
    pub fn params_object(&self) -> Result<Map<String, Value>> {
        match &self.params {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            _ => Err(FmpError::InvalidParams("params must be an object".into())),
        }
    }
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create error from FmpError
    pub fn from_error(id: Value, err: &FmpError) -> Self {
        let mut response = Self::error(id, err.code(), err.to_string());
        if let (Some(error), FmpError::RateLimited(secs)) = (response.error.as_mut(), err) {
            error.data = Some(serde_json::json!({ "retryAfter": secs }));
        }
        response
    }
}

/// Reply to one HTTP body or stdio line
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum McpReply {
    Single(McpResponse),
    Batch(Vec<McpResponse>),
}

/// Trait for handling MCP requests
///
/// Returns `None` for notifications.
#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn handle_request(&self, session_id: &str, request: McpRequest) -> Option<McpResponse>;
}

#[async_trait]
impl<T: McpHandler + ?Sized> McpHandler for std::sync::Arc<T> {
    async fn handle_request(&self, session_id: &str, request: McpRequest) -> Option<McpResponse> {
        (**self).handle_request(session_id, request).await
    }
}

/// Handle a parsed body: a single envelope or a batch
///
/// `None` means nothing is owed to the client (notifications only).
pub async fn handle_payload<H>(handler: &H, session_id: &str, payload: Value) -> Option<McpReply>
where
    H: McpHandler + ?Sized,
{
    match payload {
        Value::Array(items) if items.is_empty() => Some(McpReply::Single(McpResponse::from_error(
            Value::Null,
            &FmpError::BadRequest("empty batch".into()),
        ))),
        Value::Array(items) => {
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                if let Some(response) = handle_envelope(handler, session_id, item).await {
                    responses.push(response);
                }
            }
            (!responses.is_empty()).then_some(McpReply::Batch(responses))
        }
        single => handle_envelope(handler, session_id, single)
            .await
            .map(McpReply::Single),
    }
}

/// Handle raw body text, reporting unparseable JSON as a parse error
pub async fn handle_text<H>(handler: &H, session_id: &str, text: &str) -> Option<McpReply>
where
    H: McpHandler + ?Sized,
{
    match serde_json::from_str::<Value>(text) {
        Ok(payload) => handle_payload(handler, session_id, payload).await,
        Err(e) => Some(McpReply::Single(McpResponse::from_error(
            Value::Null,
            &FmpError::Parse(e.to_string()),
        ))),
    }
}

async fn handle_envelope<H>(handler: &H, session_id: &str, value: Value) -> Option<McpResponse>
where
    H: McpHandler + ?Sized,
{
    match McpRequest::from_value(value) {
        Ok(request) => handler.handle_request(session_id, request).await,
        Err(response) => Some(response),
    }
}

/// MCP server over stdin/stdout, one session for the process lifetime
pub struct McpServer<H>
where
    H: McpHandler,
{
    handler: H,
    session_id: String,
}

impl<H: McpHandler> McpServer<H> {
    /// Create a new MCP server
    pub fn new(handler: H, session_id: String) -> Self {
        Self {
            handler,
            session_id,
        }
    }

    /// Run the server, reading from stdin and writing to stdout
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut writer = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(reply) = handle_text(&self.handler, &self.session_id, trimmed).await {
                let mut json = serde_json::to_string(&reply)?;
                json.push('\n');
                writer.write_all(json.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("stdin closed, stopping stdio transport");
        Ok(())
    }
}

/// Standard MCP methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";
    pub const LIST_RESOURCES: &str = "resources/list";
    pub const READ_RESOURCE: &str = "resources/read";
    pub const NOTIFICATION_PREFIX: &str = "notifications/";
}

/// Tool entry in a `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&crate::catalog::ToolDefinition> for ToolDescriptor {
    fn from(tool: &crate::catalog::ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            title: (!tool.title.is_empty()).then(|| tool.title.clone()),
            description: tool.display_description(),
            input_schema: tool.input_schema(),
        }
    }
}

/// MCP initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Server capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
    pub resources: Option<ResourcesCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesCapability {
    pub subscribe: bool,
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: "fmp-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        }
    }
}

impl InitializeResult {
    /// Agree on the client's version when supported, else offer the default
    pub fn negotiate(requested: Option<&str>) -> Self {
        let mut result = Self::default();
        if let Some(version) = requested.filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v)) {
            result.protocol_version = version.to_string();
        }
        result
    }
}

/// Resource entry in a `resources/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolCallResult {
    /// Create a text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    /// Create a pretty-printed JSON result
    pub fn json(value: &impl Serialize) -> Result<Self> {
        Ok(Self::text(serde_json::to_string_pretty(value)?))
    }
}
