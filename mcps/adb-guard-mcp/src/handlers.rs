//! ADB guard tool handler implementations
//!
//! Every device tool builds an [`Operation`] and hands it to the gateway.
//! Handlers never call adb themselves; they only shape the outcome into an
//! MCP result using mcp-common helpers.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use mcp_common::{
    image_success, internal_error, invalid_params, invalid_request, json_success, text_success,
    CallToolResult, McpError,
};
use serde::Serialize;
use serde_json::json;

use crate::adb::screenshot::extract_png;
use crate::config::AdbGuardConfig;
use crate::device::ExecutionError;
use crate::gateway::{ExecutionContext, ExecutionOutcome, ExecutionOutput, Gateway};
use crate::operation::Operation;
use crate::output::limit_output;
use crate::params::*;
use crate::security::{ConfirmationRequest, RiskLevel, SecurityError};

/// Full bug reports routinely take minutes
const BUGREPORT_TIMEOUT: Duration = Duration::from_secs(300);

/// Returned instead of output when a HIGH risk operation needs a token
#[derive(Debug, Serialize)]
struct ConfirmationResponse<'a> {
    status: &'static str,
    risk: RiskLevel,
    category: &'a str,
    description: &'a str,
    command: &'a str,
    message: &'a str,
    confirmation_token: &'a str,
    expires_at: String,
}

fn confirmation_response(request: &ConfirmationRequest) -> Result<CallToolResult, McpError> {
    json_success(&ConfirmationResponse {
        status: "confirmation_required",
        risk: request.risk,
        category: &request.category,
        description: &request.description,
        command: &request.command,
        message: &request.message,
        confirmation_token: &request.token,
        expires_at: request.expires_at.to_rfc3339(),
    })
}

fn security_error(err: SecurityError) -> McpError {
    match err {
        SecurityError::Sanitize(e) => invalid_params(e.to_string()),
        SecurityError::Policy(e) => invalid_request(e.to_string()),
        SecurityError::Confirmation(e) => invalid_request(e.to_string()),
    }
}

fn execution_error(err: ExecutionError) -> McpError {
    internal_error(format!("ADB error: {err}"))
}

/// What a handler gets back from the gateway
enum Dispatched {
    Ran(ExecutionOutput),
    /// Already a complete response (confirmation request)
    Respond(CallToolResult),
}

/// Common arguments of every device tool
struct Call<'a> {
    device: Option<&'a str>,
    confirmation_token: Option<&'a str>,
    timeout: Option<Duration>,
}

impl<'a> Call<'a> {
    fn new(device: Option<&'a str>, confirmation_token: Option<&'a str>) -> Self {
        Self {
            device,
            confirmation_token,
            timeout: None,
        }
    }

    fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Run an operation through the gateway and return its raw outcome.
///
/// An explicit serial goes to the gateway untouched so it is sanitized and
/// the command classified before any device lookup. Without one, the only
/// connected device is picked.
async fn dispatch(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    call: Call<'_>,
    operation: Operation,
) -> Result<ExecutionOutcome, McpError> {
    let serial = match call.device {
        Some(serial) => serial.to_string(),
        None => {
            gateway
                .select_device(None)
                .await
                .map_err(|e| internal_error(format!("Device error: {e}")))?
                .serial
        }
    };

    let floor = config
        .security
        .operation_floors
        .get(&operation.kind())
        .copied();
    let ctx = ExecutionContext::new(serial, operation)
        .with_risk_override(floor)
        .with_confirmation(call.confirmation_token.map(str::to_string))
        .with_timeout(call.timeout);

    Ok(gateway.execute(ctx).await)
}

fn settle(outcome: ExecutionOutcome) -> Result<Dispatched, McpError> {
    match outcome {
        ExecutionOutcome::Success(output) => Ok(Dispatched::Ran(output)),
        ExecutionOutcome::ConfirmationRequired(request) => {
            Ok(Dispatched::Respond(confirmation_response(&request)?))
        }
        ExecutionOutcome::Rejected(e) => Err(security_error(e)),
        ExecutionOutcome::Failed(e) => Err(execution_error(e)),
    }
}

async fn run(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    call: Call<'_>,
    operation: Operation,
) -> Result<Dispatched, McpError> {
    settle(dispatch(gateway, config, call, operation).await?)
}

/// Text response, prefixed with the MEDIUM risk warning when there is one
fn annotated(output: &ExecutionOutput, body: String) -> CallToolResult {
    match &output.warning {
        Some(warning) => text_success(format!("WARNING: {warning}\n\n{body}")),
        None => text_success(body),
    }
}

fn or_done(text: String, done: &str) -> String {
    if text.trim().is_empty() {
        done.to_string()
    } else {
        text
    }
}

pub async fn devices(gateway: &Gateway, _params: DevicesParams) -> Result<CallToolResult, McpError> {
    let devices = gateway
        .devices()
        .await
        .map_err(|e| internal_error(format!("Failed to list devices: {e}")))?;
    json_success(&devices)
}

pub fn classify(gateway: &Gateway, params: ClassifyParams) -> Result<CallToolResult, McpError> {
    let classification = gateway.classify(&params.command);
    let decision = match classification.risk {
        RiskLevel::Safe | RiskLevel::Low => "allow",
        RiskLevel::Medium => "allow_with_warning",
        RiskLevel::High => "confirmation_required",
        RiskLevel::Critical => "blocked",
    };
    json_success(&json!({
        "command": params.command,
        "risk": classification.risk,
        "category": classification.category,
        "description": classification.description,
        "decision": decision,
    }))
}

pub async fn shell(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: ShellParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref())
        .with_timeout(params.timeout_secs.map(Duration::from_secs));
    let operation = Operation::Shell {
        command: params.command,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    let max_lines = params
        .max_lines
        .or(Some(i64::from(config.limits.log_lines)));
    let mut text = limit_output(
        &output.stdout_text(),
        max_lines,
        config.limits.max_output_bytes,
    );
    if !output.stderr.trim().is_empty() {
        text.push_str(&format!("\n[stderr]\n{}", output.stderr.trim_end()));
    }
    Ok(annotated(&output, text))
}

/// Parse `getprop` output (`[key]: [value]` per line)
pub fn parse_properties(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once("]: [")?;
            let key = key.strip_prefix('[')?;
            let value = value.strip_suffix(']')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

pub async fn properties(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: PropertiesParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let output = match run(gateway, config, call, Operation::Properties).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    let mut props = parse_properties(&output.stdout_text());
    if let Some(prefix) = params.prefix.as_deref() {
        props.retain(|key, _| key.starts_with(prefix));
    }
    json_success(&props)
}

pub async fn logcat(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: LogcatParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::Logcat {
        lines: params.lines.unwrap_or(config.limits.log_lines),
        filter: params.filter.filter(|f| !f.trim().is_empty()),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    let text = limit_output(&output.stdout_text(), None, config.limits.max_output_bytes);
    Ok(annotated(&output, text))
}

pub async fn reboot(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: RebootParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let mode = params.mode;
    let output = match run(gateway, config, call, Operation::Reboot { mode }).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(
        &output,
        format!("Reboot issued ({})", format!("{mode:?}").to_lowercase()),
    ))
}

pub async fn screenshot(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: ScreenshotParams,
) -> Result<CallToolResult, McpError> {
    if let Some(path) = &params.output_path {
        require_free_host_path(path, params.overwrite).await?;
    }

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let output = match run(gateway, config, call, Operation::Screenshot).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    let (png, info) = extract_png(&output.stdout).map_err(execution_error)?;

    if let Some(path) = params.output_path {
        tokio::fs::write(&path, png)
            .await
            .map_err(|e| internal_error(format!("Failed to save screenshot: {e}")))?;
        Ok(text_success(format!(
            "Screenshot saved to {} ({}x{}, {} bytes)",
            path,
            info.width,
            info.height,
            png.len()
        )))
    } else {
        let b64 = general_purpose::STANDARD.encode(png);
        Ok(image_success(
            b64,
            "image/png",
            Some(format!("Screenshot {}x{}", info.width, info.height)),
        ))
    }
}

pub async fn list_dir(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: DevicePathParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::ListDir { path: params.path };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = limit_output(&output.stdout_text(), None, config.limits.max_output_bytes);
    Ok(annotated(&output, text))
}

pub async fn read_file(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: ReadFileParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::ReadFile { path: params.path };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let max_bytes = params
        .max_bytes
        .unwrap_or(config.limits.max_output_bytes)
        .min(config.limits.max_output_bytes);
    let text = limit_output(&output.stdout_text(), None, max_bytes);
    Ok(annotated(&output, text))
}

pub async fn write_file(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: WriteFileParams,
) -> Result<CallToolResult, McpError> {
    let content = if params.base64.unwrap_or(false) {
        general_purpose::STANDARD
            .decode(params.content.trim())
            .map_err(|e| invalid_params(format!("Invalid base64 content: {e}")))?
    } else {
        params.content.into_bytes()
    };
    let size = content.len();

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::WriteFile {
        path: params.path.clone(),
        content,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(
        &output,
        format!("Wrote {size} bytes to {}", params.path),
    ))
}

async fn require_host_file(path: &str) -> Result<(), McpError> {
    match tokio::fs::metadata(Path::new(path.trim())).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(invalid_params(format!("Not a file: {path}"))),
        Err(e) => Err(invalid_params(format!("Cannot read {path}: {e}"))),
    }
}

/// Host-side writes never replace an existing file unless asked to
async fn require_free_host_path(path: &str, overwrite: Option<bool>) -> Result<(), McpError> {
    if overwrite.unwrap_or(false) {
        return Ok(());
    }
    match tokio::fs::try_exists(Path::new(path.trim())).await {
        Ok(false) => Ok(()),
        Ok(true) => Err(invalid_params(format!(
            "{path} already exists on the host, set overwrite to replace it"
        ))),
        Err(e) => Err(invalid_params(format!("Cannot check {path}: {e}"))),
    }
}

pub async fn push(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: PushParams,
) -> Result<CallToolResult, McpError> {
    require_host_file(&params.local_path).await?;

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::Push {
        local: params.local_path,
        remote: params.remote_path,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = or_done(output.stdout_text().trim().to_string(), "Push complete");
    Ok(annotated(&output, text))
}

pub async fn pull(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: PullParams,
) -> Result<CallToolResult, McpError> {
    require_free_host_path(&params.local_path, params.overwrite).await?;

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::Pull {
        remote: params.remote_path,
        local: params.local_path,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = or_done(output.stdout_text().trim().to_string(), "Pull complete");
    Ok(annotated(&output, text))
}

pub async fn delete(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: DeleteParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::Delete {
        path: params.path.clone(),
        recursive: params.recursive.unwrap_or(false),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Deleted {}", params.path)))
}

pub async fn mkdir(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: DevicePathParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::MakeDir {
        path: params.path.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Created {}", params.path)))
}

pub async fn file_exists(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: DevicePathParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::FileExists {
        path: params.path.clone(),
    };
    let exists = match dispatch(gateway, config, call, operation).await? {
        ExecutionOutcome::Failed(ExecutionError::NonZeroExit { .. }) => false,
        outcome => match settle(outcome)? {
            Dispatched::Ran(_) => true,
            Dispatched::Respond(response) => return Ok(response),
        },
    };
    json_success(&json!({ "path": params.path, "exists": exists }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEntry {
    pub package: String,
    pub path: String,
}

/// Parse `pm list packages -f` output (`package:<apk path>=<name>`)
pub fn parse_packages(stdout: &str) -> Vec<PackageEntry> {
    let mut packages: Vec<PackageEntry> = stdout
        .lines()
        .filter_map(|line| {
            let entry = line.trim().strip_prefix("package:")?;
            let (path, package) = entry.rsplit_once('=')?;
            Some(PackageEntry {
                package: package.to_string(),
                path: path.to_string(),
            })
        })
        .collect();
    packages.sort_by(|a, b| a.package.cmp(&b.package));
    packages
}

pub async fn list_packages(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: ListPackagesParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::ListPackages {
        include_system: params.include_system.unwrap_or(false),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    json_success(&parse_packages(&output.stdout_text()))
}

pub async fn install(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: InstallParams,
) -> Result<CallToolResult, McpError> {
    require_host_file(&params.apk_path).await?;

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref())
        .with_timeout(Some(config.adb.max_timeout()));
    let operation = Operation::Install {
        apk: params.apk_path,
        reinstall: params.reinstall.unwrap_or(true),
        grant_permissions: params.grant_permissions.unwrap_or(false),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    // `adb install` exits 0 on some failures and reports them on stdout
    let text = output.stdout_text().trim().to_string();
    if text.contains("Failure") {
        return Err(internal_error(format!("Install failed: {text}")));
    }
    Ok(annotated(&output, or_done(text, "Success")))
}

pub async fn uninstall(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: UninstallParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::Uninstall {
        package: params.package.clone(),
        keep_data: params.keep_data.unwrap_or(false),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = output.stdout_text().trim().to_string();
    if text.contains("Failure") {
        return Err(internal_error(format!(
            "Uninstall of {} failed: {text}",
            params.package
        )));
    }
    Ok(annotated(&output, format!("Uninstalled {}", params.package)))
}

pub async fn start_app(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: StartAppParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::StartApp {
        package: params.package.clone(),
        activity: params.activity.filter(|a| !a.trim().is_empty()),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = output.stdout_text();
    if text.contains("Error:") || text.contains("No activities found") {
        return Err(internal_error(format!(
            "Failed to start {}: {}",
            params.package,
            text.trim()
        )));
    }
    Ok(annotated(&output, format!("Started {}", params.package)))
}

pub async fn stop_app(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: PackageParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::StopApp {
        package: params.package.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Stopped {}", params.package)))
}

pub async fn clear_data(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: PackageParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::ClearData {
        package: params.package.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(
        &output,
        format!("Cleared data for {}", params.package),
    ))
}

pub async fn tap(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: TapParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let (x, y) = (params.x, params.y);
    let output = match run(gateway, config, call, Operation::Tap { x, y }).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Tapped at ({x}, {y})")))
}

pub async fn swipe(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: SwipeParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let duration_ms = params.duration_ms.unwrap_or(300);
    let operation = Operation::Swipe {
        x1: params.start_x,
        y1: params.start_y,
        x2: params.end_x,
        y2: params.end_y,
        duration_ms,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(
        &output,
        format!(
            "Swiped from ({}, {}) to ({}, {}) over {}ms",
            params.start_x, params.start_y, params.end_x, params.end_y, duration_ms
        ),
    ))
}

pub async fn input_text(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: InputTextParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::InputText {
        text: params.text.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Typed: {}", params.text)))
}

pub async fn keyevent(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: KeyeventParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::KeyEvent {
        key: params.key.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    Ok(annotated(&output, format!("Sent key event: {}", params.key)))
}

pub async fn start_intent(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: StartIntentParams,
) -> Result<CallToolResult, McpError> {
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let component = format!("{}/{}", params.package, params.activity);
    let extras = params.extras.unwrap_or_default();
    let extra_count = extras.len();
    let operation = Operation::StartIntent {
        package: params.package,
        activity: params.activity,
        extras,
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = output.stdout_text();
    if text.contains("Error:") {
        return Err(internal_error(format!(
            "Failed to start {component}: {}",
            text.trim()
        )));
    }
    Ok(annotated(
        &output,
        format!("Started {component} with {extra_count} extra(s)"),
    ))
}

pub async fn bugreport(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: BugreportParams,
) -> Result<CallToolResult, McpError> {
    let output_path = match params.output_path.filter(|p| !p.trim().is_empty()) {
        Some(path) => path,
        None => std::env::temp_dir()
            .join(format!("bugreport_{}.zip", Utc::now().format("%Y%m%d_%H%M%S")))
            .to_string_lossy()
            .into_owned(),
    };
    require_free_host_path(&output_path, params.overwrite).await?;

    let timeout = params
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(BUGREPORT_TIMEOUT);
    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref())
        .with_timeout(Some(timeout));
    let operation = Operation::Bugreport {
        output: output_path.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };

    let size = tokio::fs::metadata(Path::new(output_path.trim()))
        .await
        .map_err(|e| internal_error(format!("Bug report was not written to {output_path}: {e}")))?
        .len();
    Ok(annotated(
        &output,
        format!(
            "Bug report saved to {output_path} ({:.2} MB)",
            size as f64 / (1024.0 * 1024.0)
        ),
    ))
}

/// `/data/local/tmp/<name>_<java|native>_heap_<timestamp>.hprof`
fn default_heap_path(process: &str, native: bool) -> String {
    let name = if !process.is_empty() && process.chars().all(|c| c.is_ascii_digit()) {
        format!("pid_{process}")
    } else {
        process
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect()
    };
    let heap = if native { "native" } else { "java" };
    format!(
        "/data/local/tmp/{name}_{heap}_heap_{}.hprof",
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

pub async fn dump_heap(
    gateway: &Gateway,
    config: &AdbGuardConfig,
    params: DumpHeapParams,
) -> Result<CallToolResult, McpError> {
    let native = params.native.unwrap_or(false);
    let process = params.process.trim().to_string();
    let device_path = params
        .device_path
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| default_heap_path(&process, native));
    if let Some(local) = &params.local_path {
        require_free_host_path(local, params.overwrite).await?;
    }

    let call = Call::new(params.device.as_deref(), params.confirmation_token.as_deref());
    let operation = Operation::DumpHeap {
        process: process.clone(),
        native,
        device_path: device_path.clone(),
    };
    let output = match run(gateway, config, call, operation).await? {
        Dispatched::Ran(output) => output,
        Dispatched::Respond(response) => return Ok(response),
    };
    let text = output.stdout_text();
    if text.contains("Error") || text.contains("Exception") {
        return Err(internal_error(format!(
            "Heap dump of {process} failed: {}",
            text.trim()
        )));
    }

    let Some(local) = params.local_path else {
        return Ok(annotated(
            &output,
            format!("Heap dump of {process} written to {device_path} on the device"),
        ));
    };

    // the copy to the host is its own gateway call
    let call = Call::new(params.device.as_deref(), None);
    let pull = Operation::Pull {
        remote: device_path.clone(),
        local: local.clone(),
    };
    if let Dispatched::Respond(response) = run(gateway, config, call, pull).await? {
        return Ok(response);
    }
    Ok(annotated(
        &output,
        format!("Heap dump of {process} saved to {local} (device copy at {device_path})"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let stdout = "[ro.product.model]: [Pixel 7]\n\
                      [ro.build.version.sdk]: [34]\n\
                      [persist.sys.empty]: []\n\
                      garbage line\n";
        let props = parse_properties(stdout);
        assert_eq!(props.len(), 3);
        assert_eq!(props["ro.product.model"], "Pixel 7");
        assert_eq!(props["ro.build.version.sdk"], "34");
        assert_eq!(props["persist.sys.empty"], "");
    }

    #[test]
    fn test_parse_packages() {
        let stdout = "package:/data/app/~~x==/com.zeta-1/base.apk=com.zeta\n\
                      package:/system/app/Camera/Camera.apk=com.android.camera\n\
                      \n";
        let packages = parse_packages(stdout);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].package, "com.android.camera");
        assert_eq!(packages[1].package, "com.zeta");
        assert_eq!(packages[1].path, "/data/app/~~x==/com.zeta-1/base.apk");
    }

    #[tokio::test]
    async fn test_host_writes_keep_existing_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let existing = file.path().to_string_lossy().into_owned();

        let err = require_free_host_path(&existing, None).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(require_free_host_path(&existing, Some(true)).await.is_ok());

        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("screen.png");
        assert!(require_free_host_path(&fresh.to_string_lossy(), None).await.is_ok());
    }

    #[test]
    fn test_default_heap_path() {
        let java = default_heap_path("com.example.app", false);
        assert!(java.starts_with("/data/local/tmp/com.example.app_java_heap_"));
        assert!(java.ends_with(".hprof"));

        let native = default_heap_path("4242", true);
        assert!(native.starts_with("/data/local/tmp/pid_4242_native_heap_"));
    }

    #[test]
    fn test_security_error_codes() {
        use crate::security::{ConfirmationError, SanitizeError};
        use rmcp::model::ErrorCode;

        let sanitize = security_error(SanitizeError::Empty(crate::security::InputKind::Path).into());
        assert_eq!(sanitize.code, ErrorCode::INVALID_PARAMS);

        let stale = security_error(ConfirmationError::Expired.into());
        assert_eq!(stale.code, ErrorCode::INVALID_REQUEST);
    }
}
