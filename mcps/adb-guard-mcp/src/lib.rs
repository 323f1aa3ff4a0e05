//! ADB Guard MCP Server
//!
//! Android Debug Bridge tools behind a security gateway. Every tool call is
//! sanitized, risk-classified and run through a policy engine before the
//! adb binary is invoked.

pub mod adb;
pub mod audit;
pub mod config;
pub mod device;
pub mod gateway;
pub mod handlers;
pub mod operation;
pub mod output;
pub mod params;
pub mod security;
pub mod server;

pub use server::AdbGuardServer;
