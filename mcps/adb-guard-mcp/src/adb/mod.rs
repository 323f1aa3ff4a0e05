//! adb binary integration

mod executor;
mod registry;
pub mod screenshot;

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub use executor::AdbExecutor;
pub use registry::{parse_devices, AdbRegistry};

use crate::device::ExecutionError;

/// Timeout for `adb devices`
pub const DEVICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Run an adb command, feeding `stdin` if given, and kill it when `timeout`
/// elapses or the future is dropped.
pub async fn run_adb_with_timeout(
    cmd: &mut Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output, ExecutionError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    let run = async move {
        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data).await?;
            pipe.shutdown().await?;
        }
        child.wait_with_output().await
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(ExecutionError::Timeout(timeout)),
    }
}
