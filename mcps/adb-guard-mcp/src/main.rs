//! ADB Guard MCP Server
//!
//! # Usage
//!
//! Run directly: `adb-guard-mcp`
//!
//! Or configure in `.mcp.json`:
//! ```json
//! { "mcpServers": { "adb": { "command": "./adb-guard-mcp" } } }
//! ```
//!
//! Configuration is read from `$ADB_GUARD_CONFIG_PATH`, `./adb-guard.toml`
//! or `~/.config/adb-guard/config.toml`.

use adb_guard_mcp::AdbGuardServer;

mcp_common::serve_stdio!(AdbGuardServer, "adb_guard_mcp");
