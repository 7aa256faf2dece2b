//! Error types and JSON-RPC error codes for the MCP server.

use weixin_spider::SpiderError;

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP and spider-specific error codes.
pub mod mcp_error_codes {
    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const FETCH_EXHAUSTED: i32 = -32860;
    pub const DRIVER_INIT: i32 = -32861;
    pub const PERSISTENCE: i32 = -32862;
    pub const SPIDER_ERROR: i32 = -32863;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Fetch failed: {0}")]
    FetchExhausted(String),

    #[error("Browser unavailable: {0}")]
    DriverInit(String),

    #[error("Save failed: {0}")]
    Persistence(String),

    #[error("Spider error: {0}")]
    Spider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::FetchExhausted(_) => FETCH_EXHAUSTED,
            McpError::DriverInit(_) => DRIVER_INIT,
            McpError::Persistence(_) => PERSISTENCE,
            McpError::Spider(_) => SPIDER_ERROR,
            McpError::Json(_) => PARSE_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }
}

impl From<SpiderError> for McpError {
    fn from(e: SpiderError) -> Self {
        match e {
            SpiderError::Validation(msg) => McpError::InvalidParams(msg),
            SpiderError::FetchExhausted { .. } => McpError::FetchExhausted(e.to_string()),
            SpiderError::DriverInit(msg) => McpError::DriverInit(msg),
            SpiderError::Persistence(msg) => McpError::Persistence(msg),
            other => McpError::Spider(other.to_string()),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
