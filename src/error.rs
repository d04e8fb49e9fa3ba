//! Error types for fmp-mcp

use thiserror::Error;

/// Result type alias for fmp-mcp operations
pub type Result<T> = std::result::Result<T, FmpError>;

/// JSON-RPC error codes used on the wire
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const UNAUTHORIZED: i64 = -32001;
    pub const NOT_INITIALIZED: i64 = -32002;
    pub const UPSTREAM_TIMEOUT: i64 = -32003;
    pub const UPSTREAM_ERROR: i64 = -32004;
    pub const RATE_LIMITED: i64 = -32005;
}

/// Main error type for fmp-mcp
#[derive(Error, Debug)]
pub enum FmpError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session not initialized")]
    NotInitialized,

    #[error("Upstream request timed out after {0} seconds")]
    UpstreamTimeout(u64),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FmpError {
    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            FmpError::Parse(_) => codes::PARSE_ERROR,
            FmpError::BadRequest(_) => codes::INVALID_REQUEST,
            FmpError::MethodNotFound(_) | FmpError::UnknownTool(_) => codes::METHOD_NOT_FOUND,
            FmpError::InvalidParams(_) => codes::INVALID_PARAMS,
            FmpError::Unauthorized => codes::UNAUTHORIZED,
            FmpError::NotInitialized => codes::NOT_INITIALIZED,
            FmpError::UpstreamTimeout(_) => codes::UPSTREAM_TIMEOUT,
            FmpError::Upstream(_) => codes::UPSTREAM_ERROR,
            FmpError::RateLimited(_) => codes::RATE_LIMITED,
            FmpError::Config(_)
            | FmpError::Serialization(_)
            | FmpError::Io(_)
            | FmpError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<reqwest::Error> for FmpError {
    fn from(e: reqwest::Error) -> Self {
        FmpError::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        assert_eq!(FmpError::BadRequest("x".into()).code(), -32600);
        assert_eq!(FmpError::UnknownTool("x".into()).code(), -32601);
        assert_eq!(FmpError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(FmpError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(FmpError::Internal("x".into()).code(), -32603);
        assert_eq!(FmpError::UpstreamTimeout(20).code(), -32003);
        assert_eq!(FmpError::Unauthorized.code(), -32001);
    }
}
