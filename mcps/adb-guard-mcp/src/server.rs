//! MCP Server implementation for guarded Android Debug Bridge operations

use std::sync::Arc;

use anyhow::Context;
use mcp_common::{CallToolResult, McpError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use crate::adb::{AdbExecutor, AdbRegistry};
use crate::config::AdbGuardConfig;
use crate::gateway::Gateway;
use crate::handlers;
use crate::params::*;
use crate::security::Security;

/// The ADB guard MCP Server
#[derive(Clone)]
pub struct AdbGuardServer {
    gateway: Gateway,
    config: Arc<AdbGuardConfig>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AdbGuardServer {
    /// Load configuration and wire the gateway to the adb binary
    pub fn try_new() -> anyhow::Result<Self> {
        let config = AdbGuardConfig::load().context("Failed to load configuration")?;
        let security = Security::new(&config.security).context("Invalid security configuration")?;

        let gateway = Gateway::new(
            Arc::new(security),
            Arc::new(AdbExecutor::new(&config.adb.binary)),
            Arc::new(AdbRegistry::new(&config.adb.binary)),
        )
        .with_timeouts(config.adb.default_timeout(), config.adb.max_timeout());

        tracing::info!(
            adb = %config.adb.binary,
            device_root = %config.security.device_root,
            extra_rules = config.security.rules.len(),
            "Security gateway ready"
        );
        Ok(Self::with_gateway(gateway, config))
    }

    pub fn with_gateway(gateway: Gateway, config: AdbGuardConfig) -> Self {
        Self {
            gateway,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all connected ADB devices with serial numbers and model info")]
    async fn adb_devices(
        &self,
        Parameters(params): Parameters<DevicesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::devices(&self.gateway, params).await
    }

    #[tool(
        description = "Classify a shell command's risk (safe, low, medium, high, critical) without running it"
    )]
    async fn adb_classify(
        &self,
        Parameters(params): Parameters<ClassifyParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::classify(&self.gateway, params)
    }

    #[tool(
        description = "Execute a single shell command on the device. Chaining, pipes and substitutions are rejected. HIGH risk commands return a confirmation token; CRITICAL commands are blocked."
    )]
    async fn adb_shell(
        &self,
        Parameters(params): Parameters<ShellParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::shell(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Read system properties (getprop) as a JSON map, optionally filtered by prefix")]
    async fn adb_properties(
        &self,
        Parameters(params): Parameters<PropertiesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::properties(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Read recent logcat lines, optionally filtered (e.g. \"ActivityManager:I *:S\")")]
    async fn adb_logcat(
        &self,
        Parameters(params): Parameters<LogcatParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::logcat(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Reboot the device (normal or recovery require confirmation; bootloader is blocked)"
    )]
    async fn adb_reboot(
        &self,
        Parameters(params): Parameters<RebootParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::reboot(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Capture a validated screenshot from an Android device. Returns base64-encoded PNG, or writes it to output_path on the host filesystem (existing files are kept unless overwrite is set)."
    )]
    async fn adb_screenshot(
        &self,
        Parameters(params): Parameters<ScreenshotParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::screenshot(&self.gateway, &self.config, params).await
    }

    #[tool(description = "List a directory on the device (ls -la)")]
    async fn adb_list_dir(
        &self,
        Parameters(params): Parameters<DevicePathParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_dir(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Read a text file from the device")]
    async fn adb_read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::read_file(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Write content to a file on the device, creating or overwriting it")]
    async fn adb_write_file(
        &self,
        Parameters(params): Parameters<WriteFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::write_file(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Upload a file from the host to the device")]
    async fn adb_push(
        &self,
        Parameters(params): Parameters<PushParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::push(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Download a file from the device, writing it to local_path on the host filesystem (existing files are kept unless overwrite is set)"
    )]
    async fn adb_pull(
        &self,
        Parameters(params): Parameters<PullParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::pull(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Delete a file or directory on the device")]
    async fn adb_delete(
        &self,
        Parameters(params): Parameters<DeleteParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::delete(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Create a directory on the device, including missing parents")]
    async fn adb_mkdir(
        &self,
        Parameters(params): Parameters<DevicePathParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::mkdir(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Check whether a path exists on the device")]
    async fn adb_file_exists(
        &self,
        Parameters(params): Parameters<DevicePathParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::file_exists(&self.gateway, &self.config, params).await
    }

    #[tool(description = "List installed packages with their APK paths (third-party only by default)")]
    async fn adb_list_packages(
        &self,
        Parameters(params): Parameters<ListPackagesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_packages(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Install an APK from the host")]
    async fn adb_install(
        &self,
        Parameters(params): Parameters<InstallParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::install(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Uninstall a package (requires confirmation)")]
    async fn adb_uninstall(
        &self,
        Parameters(params): Parameters<UninstallParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::uninstall(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Launch an app by package name, optionally a specific activity")]
    async fn adb_start_app(
        &self,
        Parameters(params): Parameters<StartAppParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::start_app(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Start an activity with an explicit intent, passing optional string extras (--es key value)"
    )]
    async fn adb_start_intent(
        &self,
        Parameters(params): Parameters<StartIntentParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::start_intent(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Force-stop an app")]
    async fn adb_stop_app(
        &self,
        Parameters(params): Parameters<PackageParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::stop_app(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Clear all data of an app (requires confirmation)")]
    async fn adb_clear_data(
        &self,
        Parameters(params): Parameters<PackageParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::clear_data(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Capture a full bug report zip (logs, system state, processes). Writes to output_path on the host filesystem (existing files are kept unless overwrite is set) and may take several minutes."
    )]
    async fn adb_bugreport(
        &self,
        Parameters(params): Parameters<BugreportParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::bugreport(&self.gateway, &self.config, params).await
    }

    #[tool(
        description = "Capture a Java or native heap dump (am dumpheap) of a running process, optionally pulling it to local_path on the host filesystem"
    )]
    async fn adb_dump_heap(
        &self,
        Parameters(params): Parameters<DumpHeapParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::dump_heap(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Tap at specific x,y coordinates on the device screen")]
    async fn adb_tap(
        &self,
        Parameters(params): Parameters<TapParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::tap(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Perform a swipe gesture from start to end coordinates")]
    async fn adb_swipe(
        &self,
        Parameters(params): Parameters<SwipeParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::swipe(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Type text on the device (requires focus on a text field)")]
    async fn adb_input_text(
        &self,
        Parameters(params): Parameters<InputTextParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::input_text(&self.gateway, &self.config, params).await
    }

    #[tool(description = "Send a key event (e.g., BACK, HOME, ENTER, or numeric keycode)")]
    async fn adb_keyevent(
        &self,
        Parameters(params): Parameters<KeyeventParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::keyevent(&self.gateway, &self.config, params).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for AdbGuardServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Guarded ADB MCP server for Android devices. Every command is sanitized \
                 and risk-classified before it reaches the device. SAFE, LOW and MEDIUM \
                 operations run directly (MEDIUM with a warning). HIGH risk operations \
                 return status \"confirmation_required\" with a confirmation_token; repeat \
                 the identical call with that token to proceed. CRITICAL operations \
                 (partition writes, bootloader, wipes, root) are always blocked. \
                 Use adb_classify to check a command first."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
