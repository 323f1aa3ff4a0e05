//! MCP Common - shared plumbing for the adb-guard MCP server
//!
//! - **Initialization**: [`init_tracing`] and the `serve_stdio!` macro
//! - **Results**: helpers for building `CallToolResult` responses
//! - **Errors**: constructors and conversion traits for MCP errors
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{serve_stdio, json_success};
//!
//! // main.rs
//! serve_stdio!(AdbGuardServer, "adb_guard_mcp");
//!
//! // in a tool handler
//! fn devices(&self) -> Result<CallToolResult, McpError> {
//!     json_success(&self.list())
//! }
//! ```

pub mod error;
pub mod init;
pub mod result;

pub use error::{
    internal_error, invalid_params, invalid_request, IntoMcpError, McpResult, ResultExt,
};
pub use init::{init_tracing, AUDIT_TARGET};
pub use result::{image_success, json_success, text_success};

// Re-export rmcp types that are commonly needed
pub use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
