use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::run_adb_with_timeout;
use crate::device::{DeviceExecutor, ExecOutput, ExecutionError};

/// Runs commands through the adb binary
#[derive(Debug, Clone)]
pub struct AdbExecutor {
    binary: String,
}

impl AdbExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DeviceExecutor for AdbExecutor {
    async fn run(
        &self,
        serial: &str,
        argv: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecutionError> {
        debug!(serial, ?argv, "Running adb command");

        let output = run_adb_with_timeout(
            Command::new(&self.binary).arg("-s").arg(serial).args(argv),
            stdin,
            timeout,
        )
        .await?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if let Some(err) = device_error(serial, &stderr) {
            return Err(err);
        }

        Ok(ExecOutput {
            stdout: output.stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Errors adb reports about the device itself rather than the command
fn device_error(serial: &str, stderr: &str) -> Option<ExecutionError> {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("device offline") {
        Some(ExecutionError::DeviceUnavailable {
            serial: serial.to_string(),
            state: "offline".to_string(),
        })
    } else if lower.contains("device unauthorized") {
        Some(ExecutionError::DeviceUnavailable {
            serial: serial.to_string(),
            state: "unauthorized".to_string(),
        })
    } else if lower.contains(&format!("device '{}' not found", serial.to_ascii_lowercase())) {
        Some(ExecutionError::DeviceNotFound(serial.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_from_stderr() {
        assert!(matches!(
            device_error("emulator-5554", "adb: error: device offline"),
            Some(ExecutionError::DeviceUnavailable { state, .. }) if state == "offline"
        ));
        assert!(matches!(
            device_error("abc123", "adb: device 'abc123' not found"),
            Some(ExecutionError::DeviceNotFound(serial)) if serial == "abc123"
        ));
        assert!(device_error("abc123", "ls: /nope: No such file or directory").is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let executor = AdbExecutor::new("/nonexistent/adb-binary");
        let result = executor
            .run("emulator-5554", &["devices".to_string()], None, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ExecutionError::Io(_))));
    }
}
