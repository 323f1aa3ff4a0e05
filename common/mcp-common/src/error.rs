//! Error helpers for MCP tool handlers
//!
//! Tool handlers return `Result<CallToolResult, McpError>`. The helpers here
//! pick the MCP error code that matches the failure:
//!
//! - [`invalid_params`]: the caller sent input that can never succeed as-is
//! - [`invalid_request`]: the input is well formed but refused by policy
//! - [`internal_error`]: the server or the device failed while running it

use rmcp::ErrorData as McpError;

/// Type alias for MCP tool results
pub type McpResult<T> = Result<T, McpError>;

/// Conversion into an MCP error, for error types that carry no better code
/// than `internal_error`.
///
/// ```rust,ignore
/// impl IntoMcpError for ConfigError {
///     fn into_mcp_error(self) -> McpError {
///         internal_error(self.to_string())
///     }
/// }
/// ```
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for std::io::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("IO error: {self}"), None)
    }
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("JSON error: {self}"), None)
    }
}

impl IntoMcpError for anyhow::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("{self:#}"), None)
    }
}

/// Extension trait giving any `Result<T, E: IntoMcpError>` a `to_mcp_err()`.
///
/// ```rust,ignore
/// let bytes = tokio::fs::read(&path).await.to_mcp_err()?;
/// ```
pub trait ResultExt<T> {
    fn to_mcp_err(self) -> Result<T, McpError>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> Result<T, McpError> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

/// The server or device failed while carrying out a valid request.
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

/// The request parameters can never succeed as given.
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

/// The request was understood but refused (blocked by policy, stale
/// confirmation token, and so on).
pub fn invalid_request(message: impl Into<String>) -> McpError {
    McpError::invalid_request(message.into(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    #[test]
    fn test_io_error_conversion() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "apk missing"));
        let err = result.to_mcp_err().unwrap_err();
        assert!(err.message.contains("apk missing"));
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("root cause").context("loading config");
        let mcp = err.into_mcp_error();
        assert!(mcp.message.contains("loading config"));
        assert!(mcp.message.contains("root cause"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(invalid_params("bad").code, ErrorCode::INVALID_PARAMS);
        assert_eq!(invalid_request("blocked").code, ErrorCode::INVALID_REQUEST);
        assert_eq!(internal_error("boom").code, ErrorCode::INTERNAL_ERROR);
    }
}
