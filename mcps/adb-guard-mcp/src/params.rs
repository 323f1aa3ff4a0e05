//! Parameter types for ADB guard tools
//!
//! Every device tool takes an optional `device` and an optional
//! `confirmation_token`. The token is only needed for HIGH risk operations
//! and comes from the `confirmation_required` response of a previous call.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::operation::RebootMode;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DevicesParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ClassifyParams {
    #[schemars(description = "Shell command to classify. Nothing is executed.")]
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ShellParams {
    #[schemars(description = "Shell command to execute on the device (a single command, no chaining)")]
    pub command: String,

    #[schemars(
        description = "Maximum output lines: positive keeps the first N, negative keeps the last N (default: 1000)"
    )]
    #[serde(default)]
    pub max_lines: Option<i64>,

    #[schemars(description = "Timeout in seconds (default from config, capped by max_timeout_secs)")]
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PropertiesParams {
    #[schemars(description = "Only return properties whose name starts with this prefix (e.g. \"ro.build\")")]
    #[serde(default)]
    pub prefix: Option<String>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogcatParams {
    #[schemars(description = "Number of most recent lines to return (default: 1000)")]
    #[serde(default)]
    pub lines: Option<u32>,

    #[schemars(description = "logcat filter specs, e.g. \"ActivityManager:I *:S\"")]
    #[serde(default)]
    pub filter: Option<String>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RebootParams {
    #[schemars(description = "Reboot mode: \"normal\", \"recovery\" or \"bootloader\" (default: \"normal\")")]
    #[serde(default)]
    pub mode: RebootMode,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ScreenshotParams {
    #[schemars(
        description = "Host file path to save the PNG (optional, returns base64 if omitted). Writes to the host filesystem."
    )]
    #[serde(default)]
    pub output_path: Option<String>,

    #[schemars(description = "Replace output_path if it already exists (default: false)")]
    #[serde(default)]
    pub overwrite: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

/// Shared by tools that act on one device path
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DevicePathParams {
    #[schemars(description = "Path on the device (relative paths resolve against the configured device root)")]
    pub path: String,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Path of the file on the device")]
    pub path: String,

    #[schemars(description = "Maximum bytes to return (default: limits.max_output_bytes)")]
    #[serde(default)]
    pub max_bytes: Option<usize>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    #[schemars(description = "Path of the file on the device (created or overwritten)")]
    pub path: String,

    #[schemars(description = "File content")]
    pub content: String,

    #[schemars(description = "Treat content as base64-encoded binary (default: false)")]
    #[serde(default)]
    pub base64: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    #[schemars(description = "File on the host to upload")]
    pub local_path: String,

    #[schemars(description = "Destination path on the device")]
    pub remote_path: String,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PullParams {
    #[schemars(description = "File on the device to download")]
    pub remote_path: String,

    #[schemars(description = "Destination path on the host filesystem")]
    pub local_path: String,

    #[schemars(description = "Replace local_path if it already exists (default: false)")]
    #[serde(default)]
    pub overwrite: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteParams {
    #[schemars(description = "File or directory on the device to delete")]
    pub path: String,

    #[schemars(description = "Delete directories recursively (default: false)")]
    #[serde(default)]
    pub recursive: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListPackagesParams {
    #[schemars(description = "Include system packages (default: false, third-party only)")]
    #[serde(default)]
    pub include_system: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct InstallParams {
    #[schemars(description = "Path to the .apk file on the host")]
    pub apk_path: String,

    #[schemars(description = "Replace an existing installation, keeping its data (default: true)")]
    #[serde(default)]
    pub reinstall: Option<bool>,

    #[schemars(description = "Grant all runtime permissions on install (default: false)")]
    #[serde(default)]
    pub grant_permissions: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UninstallParams {
    #[schemars(description = "Package name, e.g. com.example.app")]
    pub package: String,

    #[schemars(description = "Keep the app's data and cache (default: false)")]
    #[serde(default)]
    pub keep_data: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StartAppParams {
    #[schemars(description = "Package name, e.g. com.example.app")]
    pub package: String,

    #[schemars(
        description = "Activity to start, relative (\".MainActivity\") or fully qualified (optional, launcher activity if omitted)"
    )]
    #[serde(default)]
    pub activity: Option<String>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StartIntentParams {
    #[schemars(description = "Package name, e.g. com.android.settings")]
    pub package: String,

    #[schemars(description = "Activity to start, relative (\".Settings\") or fully qualified")]
    pub activity: String,

    #[schemars(description = "String extras passed with --es, as key/value pairs (optional)")]
    #[serde(default)]
    pub extras: Option<BTreeMap<String, String>>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

/// Shared by tools that act on one installed package
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PackageParams {
    #[schemars(description = "Package name, e.g. com.example.app")]
    pub package: String,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TapParams {
    #[schemars(description = "X coordinate to tap")]
    pub x: u32,

    #[schemars(description = "Y coordinate to tap")]
    pub y: u32,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SwipeParams {
    #[schemars(description = "Starting X coordinate")]
    pub start_x: u32,

    #[schemars(description = "Starting Y coordinate")]
    pub start_y: u32,

    #[schemars(description = "Ending X coordinate")]
    pub end_x: u32,

    #[schemars(description = "Ending Y coordinate")]
    pub end_y: u32,

    #[schemars(description = "Swipe duration in milliseconds (default: 300)")]
    #[serde(default)]
    pub duration_ms: Option<u32>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct InputTextParams {
    #[schemars(description = "Text to type on the device (requires focus on a text field)")]
    pub text: String,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct KeyeventParams {
    #[schemars(description = "Key to send (e.g., BACK, HOME, ENTER, or numeric keycode)")]
    pub key: String,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BugreportParams {
    #[schemars(
        description = "Host file path for the bug report zip (optional, a file in the system temp directory if omitted). Writes to the host filesystem."
    )]
    #[serde(default)]
    pub output_path: Option<String>,

    #[schemars(description = "Replace output_path if it already exists (default: false)")]
    #[serde(default)]
    pub overwrite: Option<bool>,

    #[schemars(description = "Maximum time to wait in seconds (default: 300, capped by adb.max_timeout_secs)")]
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DumpHeapParams {
    #[schemars(description = "Package name or numeric pid of a running process")]
    pub process: String,

    #[schemars(description = "Capture the native heap instead of the Java heap (default: false)")]
    #[serde(default)]
    pub native: Option<bool>,

    #[schemars(
        description = "Where the dump is written on the device (default: /data/local/tmp/<process>_<java|native>_heap_<timestamp>.hprof)"
    )]
    #[serde(default)]
    pub device_path: Option<String>,

    #[schemars(
        description = "Host file path to pull the dump to (optional, the dump stays on the device if omitted). Writes to the host filesystem."
    )]
    #[serde(default)]
    pub local_path: Option<String>,

    #[schemars(description = "Replace local_path if it already exists (default: false)")]
    #[serde(default)]
    pub overwrite: Option<bool>,

    #[schemars(description = "Device serial number (optional, auto-selects if only one device)")]
    #[serde(default)]
    pub device: Option<String>,

    #[schemars(description = "Confirmation token from a previous confirmation_required response")]
    #[serde(default)]
    pub confirmation_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_default() {
        let params: ShellParams = serde_json::from_str(r#"{"command": "getprop"}"#).unwrap();
        assert_eq!(params.command, "getprop");
        assert!(params.device.is_none());
        assert!(params.confirmation_token.is_none());
    }

    #[test]
    fn test_reboot_mode_is_validated() {
        let params: RebootParams = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(params.mode, RebootMode::Normal);

        let params: RebootParams = serde_json::from_str(r#"{"mode": "recovery"}"#).unwrap();
        assert_eq!(params.mode, RebootMode::Recovery);

        assert!(serde_json::from_str::<RebootParams>(r#"{"mode": "edl"}"#).is_err());
    }

    #[test]
    fn test_intent_extras() {
        let params: StartIntentParams = serde_json::from_str(
            r#"{"package": "com.example.app", "activity": ".Main", "extras": {"query": "coffee"}}"#,
        )
        .unwrap();
        assert_eq!(params.extras.unwrap()["query"], "coffee");

        let params: StartIntentParams =
            serde_json::from_str(r#"{"package": "com.example.app", "activity": ".Main"}"#).unwrap();
        assert!(params.extras.is_none());
    }

    #[test]
    fn test_negative_coordinates_rejected() {
        assert!(serde_json::from_str::<TapParams>(r#"{"x": -1, "y": 10}"#).is_err());
    }
}
