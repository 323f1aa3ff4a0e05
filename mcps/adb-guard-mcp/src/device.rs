//! Device seams
//!
//! The gateway only sees these traits. `crate::adb` implements them on top of
//! the adb binary; tests substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A device as reported by `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub serial: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl DeviceHandle {
    pub fn new(serial: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: state.into(),
            model: None,
            product: None,
        }
    }

    /// Only devices in the `device` state accept commands
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Raw result of one adb invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Failures after the security checks passed
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device {serial} is {state}")]
    DeviceUnavailable { serial: String, state: String },

    #[error("No ADB devices connected")]
    NoDevices,

    #[error("Multiple devices connected, specify one of: {}", .0.join(", "))]
    AmbiguousDevice(Vec<String>),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to run adb: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected device output: {0}")]
    InvalidOutput(String),
}

/// Runs one adb invocation against one device
#[async_trait]
pub trait DeviceExecutor: Send + Sync {
    /// `argv` follows `adb -s <serial>`. `stdin`, when set, is written to the
    /// process and then closed.
    async fn run(
        &self,
        serial: &str,
        argv: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecutionError>;
}

/// Lists the devices that can currently be addressed
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<DeviceHandle>, ExecutionError>;

    /// Look up one device and make sure it accepts commands
    async fn resolve(&self, serial: &str) -> Result<DeviceHandle, ExecutionError> {
        let device = self
            .list()
            .await?
            .into_iter()
            .find(|d| d.serial == serial)
            .ok_or_else(|| ExecutionError::DeviceNotFound(serial.to_string()))?;

        if !device.is_online() {
            return Err(ExecutionError::DeviceUnavailable {
                serial: device.serial,
                state: device.state,
            });
        }
        Ok(device)
    }

    /// Use the given serial, or the only connected device when none is given
    async fn select(&self, serial: Option<&str>) -> Result<DeviceHandle, ExecutionError> {
        if let Some(serial) = serial {
            return self.resolve(serial).await;
        }

        let mut devices = self.list().await?;
        match devices.len() {
            0 => Err(ExecutionError::NoDevices),
            1 => {
                let device = devices.remove(0);
                if device.is_online() {
                    Ok(device)
                } else {
                    Err(ExecutionError::DeviceUnavailable {
                        serial: device.serial,
                        state: device.state,
                    })
                }
            }
            _ => Err(ExecutionError::AmbiguousDevice(
                devices.into_iter().map(|d| d.serial).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<DeviceHandle>);

    #[async_trait]
    impl DeviceRegistry for Fixed {
        async fn list(&self) -> Result<Vec<DeviceHandle>, ExecutionError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_select_single_device() {
        let registry = Fixed(vec![DeviceHandle::new("emulator-5554", "device")]);
        let device = registry.select(None).await.unwrap();
        assert_eq!(device.serial, "emulator-5554");
    }

    #[tokio::test]
    async fn test_select_requires_serial_when_ambiguous() {
        let registry = Fixed(vec![
            DeviceHandle::new("emulator-5554", "device"),
            DeviceHandle::new("emulator-5556", "device"),
        ]);
        assert!(matches!(
            registry.select(None).await,
            Err(ExecutionError::AmbiguousDevice(serials)) if serials.len() == 2
        ));
        assert!(registry.select(Some("emulator-5556")).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let registry = Fixed(vec![DeviceHandle::new("R58M123", "unauthorized")]);
        assert!(matches!(
            registry.resolve("R58M123").await,
            Err(ExecutionError::DeviceUnavailable { state, .. }) if state == "unauthorized"
        ));
        assert!(matches!(
            registry.resolve("missing").await,
            Err(ExecutionError::DeviceNotFound(_))
        ));
        assert!(matches!(
            Fixed(vec![]).select(None).await,
            Err(ExecutionError::NoDevices)
        ));
    }
}
