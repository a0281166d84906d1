//! ADB (Android Debug Bridge) Client
//!
//! Thin collaborator wrapper around the adb executable: connection listing,
//! shell transport and package enumeration. The adb server itself is a black
//! box; only its command-line surface is used.

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::device::{Device, DeviceState};

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// ADB Client
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: PathBuf,
}

impl Default for AdbClient {
    /// Client using the `adb` executable resolved on `PATH`
    fn default() -> Self {
        Self::new(PathBuf::from("adb"))
    }
}

impl AdbClient {
    /// Create a client for an explicit adb executable
    pub fn new(adb_path: PathBuf) -> Self {
        Self { adb_path }
    }

    /// Run an ADB command
    async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        debug!("adb {:?}", args);

        let output = Command::new(&self.adb_path).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::CommandFailed(stderr.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an ADB command for a specific device
    async fn run_for_device(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", serial];
        full_args.extend(args);
        self.run(&full_args).await
    }

    /// List connected devices, in registry insertion order
    pub async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices"]).await?;
        Ok(parse_devices(&output))
    }

    /// Run a shell command on a device
    pub async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError> {
        self.run_for_device(serial, &["shell", command]).await
    }

    /// Installed packages on a device
    pub async fn list_packages(&self, serial: &str) -> Result<HashSet<String>, AdbError> {
        let output = self.shell(serial, "pm list packages").await?;
        Ok(parse_packages(&output))
    }
}

/// Parse `adb devices` output into the connection listing.
fn parse_devices(output: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in output.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            let state = match parts[1] {
                "device" => DeviceState::Online,
                "offline" => DeviceState::Offline,
                "unauthorized" => DeviceState::Unauthorized,
                _ => DeviceState::Unknown,
            };

            devices.push(Device {
                serial: parts[0].to_string(),
                state,
            });
        }
    }

    devices
}

/// Parse `pm list packages` output into a package-name set.
fn parse_packages(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let output = "List of devices attached\n\
                      127.0.0.1:62001\tdevice\n\
                      127.0.0.1:62025\toffline\n\
                      emulator-5554\tunauthorized\n\n";
        let devices = parse_devices(output);

        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].serial, "127.0.0.1:62001");
        assert_eq!(devices[0].state, DeviceState::Online);
        assert!(devices[0].is_usable());
        assert_eq!(devices[1].state, DeviceState::Offline);
        assert_eq!(devices[2].state, DeviceState::Unauthorized);
    }

    #[test]
    fn test_parse_devices_empty() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_parse_packages() {
        let output = "package:com.android.settings\r\npackage:com.foo.bar\r\n";
        let packages = parse_packages(output);

        assert_eq!(packages.len(), 2);
        assert!(packages.contains("com.android.settings"));
        assert!(packages.contains("com.foo.bar"));
        assert!(!packages.contains("com.missing"));
    }
}
