//! Device operations and the adb commands they turn into
//!
//! Every device-bound tool is one [`Operation`] variant. [`Operation::plan`]
//! sanitizes each raw field by kind and produces the [`CommandPlan`]: the
//! argv handed to adb and the command line that gets classified.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::security::{InputKind, SanitizeError, Sanitizer};

/// Operation kinds, named after the tool that performs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "adb_shell")]
    Shell,
    #[serde(rename = "adb_properties")]
    Properties,
    #[serde(rename = "adb_logcat")]
    Logcat,
    #[serde(rename = "adb_reboot")]
    Reboot,
    #[serde(rename = "adb_screenshot")]
    Screenshot,
    #[serde(rename = "adb_list_dir")]
    ListDir,
    #[serde(rename = "adb_read_file")]
    ReadFile,
    #[serde(rename = "adb_write_file")]
    WriteFile,
    #[serde(rename = "adb_push")]
    Push,
    #[serde(rename = "adb_pull")]
    Pull,
    #[serde(rename = "adb_delete")]
    Delete,
    #[serde(rename = "adb_mkdir")]
    MakeDir,
    #[serde(rename = "adb_file_exists")]
    FileExists,
    #[serde(rename = "adb_list_packages")]
    ListPackages,
    #[serde(rename = "adb_install")]
    Install,
    #[serde(rename = "adb_uninstall")]
    Uninstall,
    #[serde(rename = "adb_start_app")]
    StartApp,
    #[serde(rename = "adb_stop_app")]
    StopApp,
    #[serde(rename = "adb_clear_data")]
    ClearData,
    #[serde(rename = "adb_tap")]
    Tap,
    #[serde(rename = "adb_swipe")]
    Swipe,
    #[serde(rename = "adb_input_text")]
    InputText,
    #[serde(rename = "adb_keyevent")]
    KeyEvent,
    #[serde(rename = "adb_start_intent")]
    StartIntent,
    #[serde(rename = "adb_bugreport")]
    Bugreport,
    #[serde(rename = "adb_dump_heap")]
    DumpHeap,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Shell => "adb_shell",
            OperationKind::Properties => "adb_properties",
            OperationKind::Logcat => "adb_logcat",
            OperationKind::Reboot => "adb_reboot",
            OperationKind::Screenshot => "adb_screenshot",
            OperationKind::ListDir => "adb_list_dir",
            OperationKind::ReadFile => "adb_read_file",
            OperationKind::WriteFile => "adb_write_file",
            OperationKind::Push => "adb_push",
            OperationKind::Pull => "adb_pull",
            OperationKind::Delete => "adb_delete",
            OperationKind::MakeDir => "adb_mkdir",
            OperationKind::FileExists => "adb_file_exists",
            OperationKind::ListPackages => "adb_list_packages",
            OperationKind::Install => "adb_install",
            OperationKind::Uninstall => "adb_uninstall",
            OperationKind::StartApp => "adb_start_app",
            OperationKind::StopApp => "adb_stop_app",
            OperationKind::ClearData => "adb_clear_data",
            OperationKind::Tap => "adb_tap",
            OperationKind::Swipe => "adb_swipe",
            OperationKind::InputText => "adb_input_text",
            OperationKind::KeyEvent => "adb_keyevent",
            OperationKind::StartIntent => "adb_start_intent",
            OperationKind::Bugreport => "adb_bugreport",
            OperationKind::DumpHeap => "adb_dump_heap",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RebootMode {
    #[default]
    Normal,
    Recovery,
    Bootloader,
}

/// One device-bound action with its raw, unsanitized inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Shell { command: String },
    Properties,
    Logcat { lines: u32, filter: Option<String> },
    Reboot { mode: RebootMode },
    Screenshot,
    ListDir { path: String },
    ReadFile { path: String },
    WriteFile { path: String, content: Vec<u8> },
    Push { local: String, remote: String },
    Pull { remote: String, local: String },
    Delete { path: String, recursive: bool },
    MakeDir { path: String },
    FileExists { path: String },
    ListPackages { include_system: bool },
    Install { apk: String, reinstall: bool, grant_permissions: bool },
    Uninstall { package: String, keep_data: bool },
    StartApp { package: String, activity: Option<String> },
    StopApp { package: String },
    ClearData { package: String },
    Tap { x: u32, y: u32 },
    Swipe { x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u32 },
    InputText { text: String },
    KeyEvent { key: String },
    /// `am start` with string extras
    StartIntent {
        package: String,
        activity: String,
        extras: BTreeMap<String, String>,
    },
    /// Written by adb to `output` on the host
    Bugreport { output: String },
    /// `process` is a package name or a pid
    DumpHeap {
        process: String,
        native: bool,
        device_path: String,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Shell { .. } => OperationKind::Shell,
            Operation::Properties => OperationKind::Properties,
            Operation::Logcat { .. } => OperationKind::Logcat,
            Operation::Reboot { .. } => OperationKind::Reboot,
            Operation::Screenshot => OperationKind::Screenshot,
            Operation::ListDir { .. } => OperationKind::ListDir,
            Operation::ReadFile { .. } => OperationKind::ReadFile,
            Operation::WriteFile { .. } => OperationKind::WriteFile,
            Operation::Push { .. } => OperationKind::Push,
            Operation::Pull { .. } => OperationKind::Pull,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::MakeDir { .. } => OperationKind::MakeDir,
            Operation::FileExists { .. } => OperationKind::FileExists,
            Operation::ListPackages { .. } => OperationKind::ListPackages,
            Operation::Install { .. } => OperationKind::Install,
            Operation::Uninstall { .. } => OperationKind::Uninstall,
            Operation::StartApp { .. } => OperationKind::StartApp,
            Operation::StopApp { .. } => OperationKind::StopApp,
            Operation::ClearData { .. } => OperationKind::ClearData,
            Operation::Tap { .. } => OperationKind::Tap,
            Operation::Swipe { .. } => OperationKind::Swipe,
            Operation::InputText { .. } => OperationKind::InputText,
            Operation::KeyEvent { .. } => OperationKind::KeyEvent,
            Operation::StartIntent { .. } => OperationKind::StartIntent,
            Operation::Bugreport { .. } => OperationKind::Bugreport,
            Operation::DumpHeap { .. } => OperationKind::DumpHeap,
        }
    }

    /// The caller's input as received, for audit records
    pub fn raw_input(&self) -> String {
        match self {
            Operation::Shell { command } => command.clone(),
            Operation::Properties | Operation::Screenshot => String::new(),
            Operation::Logcat { lines, filter } => match filter {
                Some(filter) => format!("{lines} lines, filter {filter}"),
                None => format!("{lines} lines"),
            },
            Operation::Reboot { mode } => format!("{mode:?}").to_lowercase(),
            Operation::ListDir { path }
            | Operation::ReadFile { path }
            | Operation::MakeDir { path }
            | Operation::FileExists { path } => path.clone(),
            Operation::WriteFile { path, content } => {
                format!("{path} ({} bytes)", content.len())
            }
            Operation::Push { local, remote } => format!("{local} -> {remote}"),
            Operation::Pull { remote, local } => format!("{remote} -> {local}"),
            Operation::Delete { path, recursive } => {
                if *recursive {
                    format!("{path} (recursive)")
                } else {
                    path.clone()
                }
            }
            Operation::ListPackages { include_system } => {
                format!("include_system={include_system}")
            }
            Operation::Install { apk, .. } => apk.clone(),
            Operation::Uninstall { package, .. }
            | Operation::StopApp { package }
            | Operation::ClearData { package } => package.clone(),
            Operation::StartApp { package, activity } => match activity {
                Some(activity) => format!("{package}/{activity}"),
                None => package.clone(),
            },
            Operation::Tap { x, y } => format!("{x},{y}"),
            Operation::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => format!("{x1},{y1} -> {x2},{y2} ({duration_ms}ms)"),
            Operation::InputText { text } => text.clone(),
            Operation::KeyEvent { key } => key.clone(),
            Operation::StartIntent {
                package,
                activity,
                extras,
            } => {
                let extras: Vec<String> = extras.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{package}/{activity} [{}]", extras.join(", "))
            }
            Operation::Bugreport { output } => output.clone(),
            Operation::DumpHeap {
                process,
                native,
                device_path,
            } => {
                let heap = if *native { "native" } else { "java" };
                format!("{process} ({heap}) -> {device_path}")
            }
        }
    }

    /// Sanitize every raw field and build the command to run
    pub fn plan(&self, sanitizer: &Sanitizer) -> Result<CommandPlan, SanitizeError> {
        let kind = self.kind();
        let path = |raw: &str| -> Result<String, SanitizeError> {
            Sanitizer::quote(&sanitizer.sanitize(raw, InputKind::Path)?)
        };
        let package =
            |raw: &str| -> Result<String, SanitizeError> { sanitizer.sanitize(raw, InputKind::PackageName) };

        let plan = match self {
            Operation::Shell { command } => {
                CommandPlan::shell(kind, sanitizer.sanitize(command, InputKind::ShellArg)?)
            }
            Operation::Properties => CommandPlan::shell(kind, "getprop".to_string()),
            Operation::Logcat { lines, filter } => {
                let mut script = format!("logcat -d -v threadtime -t {}", (*lines).max(1));
                if let Some(filter) = filter {
                    for spec in filter.split_whitespace() {
                        script.push(' ');
                        script.push_str(&Sanitizer::quote(spec)?);
                    }
                }
                CommandPlan::shell(kind, script)
            }
            Operation::Reboot { mode } => {
                let mut args = vec!["reboot".to_string()];
                match mode {
                    RebootMode::Normal => {}
                    RebootMode::Recovery => args.push("recovery".to_string()),
                    RebootMode::Bootloader => args.push("bootloader".to_string()),
                }
                CommandPlan::adb(kind, args)?
            }
            Operation::Screenshot => CommandPlan::exec_out(kind, "screencap -p".to_string()),
            Operation::ListDir { path: raw } => {
                CommandPlan::shell(kind, format!("ls -la {}", path(raw)?))
            }
            Operation::ReadFile { path: raw } => {
                CommandPlan::exec_out(kind, format!("cat {}", path(raw)?))
            }
            Operation::WriteFile { path: raw, content } => {
                CommandPlan::exec_in(kind, format!("cat > {}", path(raw)?), content.clone())
            }
            Operation::Push { local, remote } => CommandPlan::adb(
                kind,
                vec![
                    "push".to_string(),
                    host_path(local)?,
                    sanitizer.sanitize(remote, InputKind::Path)?,
                ],
            )?,
            Operation::Pull { remote, local } => CommandPlan::adb(
                kind,
                vec![
                    "pull".to_string(),
                    sanitizer.sanitize(remote, InputKind::Path)?,
                    host_path(local)?,
                ],
            )?,
            Operation::Delete {
                path: raw,
                recursive,
            } => {
                let flags = if *recursive { "-rf" } else { "-f" };
                CommandPlan::shell(kind, format!("rm {flags} {}", path(raw)?))
            }
            Operation::MakeDir { path: raw } => {
                CommandPlan::shell(kind, format!("mkdir -p {}", path(raw)?))
            }
            Operation::FileExists { path: raw } => {
                CommandPlan::shell(kind, format!("ls -d {}", path(raw)?))
            }
            Operation::ListPackages { include_system } => {
                let script = if *include_system {
                    "pm list packages -f"
                } else {
                    "pm list packages -f -3"
                };
                CommandPlan::shell(kind, script.to_string())
            }
            Operation::Install {
                apk,
                reinstall,
                grant_permissions,
            } => {
                let apk = host_path(apk)?;
                if !apk.to_ascii_lowercase().ends_with(".apk") {
                    return Err(SanitizeError::invalid("APK file", apk));
                }
                let mut args = vec!["install".to_string()];
                if *reinstall {
                    args.push("-r".to_string());
                }
                if *grant_permissions {
                    args.push("-g".to_string());
                }
                args.push(apk);
                CommandPlan::adb(kind, args)?
            }
            Operation::Uninstall {
                package: raw,
                keep_data,
            } => {
                let flags = if *keep_data { " -k" } else { "" };
                CommandPlan::shell(kind, format!("pm uninstall{flags} {}", package(raw)?))
            }
            Operation::StartApp {
                package: raw,
                activity,
            } => {
                let package = package(raw)?;
                let script = match activity {
                    Some(activity) => {
                        let activity = sanitizer.sanitize(activity, InputKind::ActivityName)?;
                        format!("am start -n {package}/{activity}")
                    }
                    None => format!(
                        "monkey -p {package} -c android.intent.category.LAUNCHER 1"
                    ),
                };
                CommandPlan::shell(kind, script)
            }
            Operation::StopApp { package: raw } => {
                CommandPlan::shell(kind, format!("am force-stop {}", package(raw)?))
            }
            Operation::ClearData { package: raw } => {
                CommandPlan::shell(kind, format!("pm clear {}", package(raw)?))
            }
            Operation::Tap { x, y } => CommandPlan::shell(kind, format!("input tap {x} {y}")),
            Operation::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => CommandPlan::shell(
                kind,
                format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}"),
            ),
            Operation::InputText { text } => {
                CommandPlan::shell(kind, format!("input text {}", Sanitizer::quote_text(text)?))
            }
            Operation::KeyEvent { key } => CommandPlan::shell(
                kind,
                format!(
                    "input keyevent {}",
                    sanitizer.sanitize(key, InputKind::KeyCode)?
                ),
            ),
            Operation::StartIntent {
                package: raw,
                activity,
                extras,
            } => {
                let mut script = format!(
                    "am start -n {}/{}",
                    package(raw)?,
                    sanitizer.sanitize(activity, InputKind::ActivityName)?
                );
                for (key, value) in extras {
                    let (key, value) = intent_extra(key, value)?;
                    script.push_str(&format!(" --es {key} {value}"));
                }
                CommandPlan::shell(kind, script)
            }
            Operation::Bugreport { output } => {
                CommandPlan::adb(kind, vec!["bugreport".to_string(), host_path(output)?])?
            }
            Operation::DumpHeap {
                process,
                native,
                device_path,
            } => {
                let process = process.trim();
                let target = if !process.is_empty() && process.chars().all(|c| c.is_ascii_digit()) {
                    process.to_string()
                } else {
                    package(process)?
                };
                let flags = if *native { " -n" } else { "" };
                CommandPlan::shell(
                    kind,
                    format!("am dumpheap{flags} {target} {}", path(device_path)?),
                )
            }
        };
        Ok(plan)
    }
}

/// A path on the machine running the server. It is passed to adb as a
/// single argument and never through a shell.
fn host_path(raw: &str) -> Result<String, SanitizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SanitizeError::invalid("host path", raw));
    }
    if trimmed.contains('\0') {
        return Err(SanitizeError::invalid("host path", raw.replace('\0', "\\0")));
    }
    Ok(trimmed.to_string())
}

/// An intent string extra: the key is a plain identifier, the value is
/// quoted as one word.
fn intent_extra(key: &str, value: &str) -> Result<(String, String), SanitizeError> {
    let valid_key = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid_key {
        return Err(SanitizeError::invalid("intent extra key", key));
    }
    if let Some(c) = value.chars().find(|c| c.is_control()) {
        return Err(SanitizeError::injection(
            InputKind::ShellArg,
            format!("control character {c:?} in intent extra {key}"),
        ));
    }
    Ok((key.to_string(), Sanitizer::quote(value)?))
}

/// Sanitized command ready for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub kind: OperationKind,
    /// Arguments after `adb -s <serial>`
    pub argv: Vec<String>,
    /// What is classified and bound into confirmation tokens
    pub command_line: String,
    pub stdin: Option<Vec<u8>>,
}

impl CommandPlan {
    fn via(kind: OperationKind, transport: &str, script: String, stdin: Option<Vec<u8>>) -> Self {
        Self {
            kind,
            argv: vec![transport.to_string(), script.clone()],
            command_line: script,
            stdin,
        }
    }

    pub fn shell(kind: OperationKind, script: String) -> Self {
        Self::via(kind, "shell", script, None)
    }

    /// Binary-safe stdout
    pub fn exec_out(kind: OperationKind, script: String) -> Self {
        Self::via(kind, "exec-out", script, None)
    }

    /// `stdin` is streamed to the device command
    pub fn exec_in(kind: OperationKind, script: String, stdin: Vec<u8>) -> Self {
        Self::via(kind, "exec-in", script, Some(stdin))
    }

    /// An adb verb other than the shell transports
    pub fn adb(kind: OperationKind, argv: Vec<String>) -> Result<Self, SanitizeError> {
        let command_line = shlex::try_join(argv.iter().map(String::as_str))
            .map_err(|e| SanitizeError::injection(InputKind::ShellArg, e.to_string()))?;
        Ok(Self {
            kind,
            argv,
            command_line,
            stdin: None,
        })
    }
}
