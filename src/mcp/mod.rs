//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC 2.0 over HTTP or stdio, dispatching tool calls to the FMP API.

pub mod args;
pub mod dispatcher;
pub mod protocol;
pub mod session;
pub mod tools;

pub use dispatcher::{Dispatcher, HELP_URI};
pub use protocol::{
    handle_payload, handle_text, methods, InitializeResult, McpHandler, McpReply, McpRequest,
    McpResponse, McpServer, ToolCallResult,
};
pub use session::{InMemorySessionStore, Session, SessionStore, SESSION_HEADER};
pub use tools::ToolExecutor;
