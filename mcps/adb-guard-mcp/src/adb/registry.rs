use async_trait::async_trait;
use tokio::process::Command;

use super::{run_adb_with_timeout, DEVICES_TIMEOUT};
use crate::device::{DeviceHandle, DeviceRegistry, ExecutionError};

/// Device listing through `adb devices -l`
#[derive(Debug, Clone)]
pub struct AdbRegistry {
    binary: String,
}

impl AdbRegistry {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DeviceRegistry for AdbRegistry {
    async fn list(&self) -> Result<Vec<DeviceHandle>, ExecutionError> {
        let output = run_adb_with_timeout(
            Command::new(&self.binary).args(["devices", "-l"]),
            None,
            DEVICES_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `adb devices -l` output
pub fn parse_devices(stdout: &str) -> Vec<DeviceHandle> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [serial, state, rest @ ..] = parts.as_slice() else {
                return None;
            };

            let mut device = DeviceHandle::new(*serial, *state);
            for part in rest {
                if let Some(val) = part.strip_prefix("model:") {
                    device.model = Some(val.replace('_', " "));
                } else if let Some(val) = part.strip_prefix("product:") {
                    device.product = Some(val.to_string());
                }
            }
            Some(device)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let output = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554          device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64xa transport_id:1
R58M1234ABC            unauthorized usb:1-1 transport_id:2
192.168.1.20:5555      offline

";
        let devices = parse_devices(output);
        assert_eq!(devices.len(), 3);

        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_online());
        assert_eq!(devices[0].model.as_deref(), Some("sdk gphone64 x86 64"));
        assert_eq!(devices[0].product.as_deref(), Some("sdk_gphone64_x86_64"));

        assert_eq!(devices[1].state, "unauthorized");
        assert!(!devices[1].is_online());
        assert_eq!(devices[2].serial, "192.168.1.20:5555");
        assert_eq!(devices[2].model, None);
    }

    #[test]
    fn test_parse_no_devices() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }
}
