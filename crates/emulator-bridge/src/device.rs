//! Device Types
//!
//! Represents adb connections and the device reference a clone holds once
//! binding completes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::adb::{AdbClient, AdbError};

/// Connection state as reported by adb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    /// Device is offline
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Unknown state
    Unknown,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Unknown => "unknown",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Online)
    }
}

/// One entry of the adb connection registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device serial number (e.g. "127.0.0.1:62001")
    pub serial: String,
    /// Connection state
    pub state: DeviceState,
}

impl Device {
    /// Check if the connection is online and usable
    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }
}

/// The adb connection a running clone is bound to.
///
/// A back-reference into the connection registry, not an owner: the
/// connection outlives nothing and is torn down by the player, not by us.
#[derive(Debug, Clone)]
pub struct BoundDevice {
    serial: String,
    client: AdbClient,
}

impl BoundDevice {
    pub fn new(serial: String, client: AdbClient) -> Self {
        Self { serial, client }
    }

    /// Serial of the bound connection
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Run a shell command on the bound device
    pub async fn shell(&self, command: &str) -> Result<String, AdbError> {
        self.client.shell(&self.serial, command).await
    }

    /// Installed packages on the bound device
    pub async fn list_packages(&self) -> Result<HashSet<String>, AdbError> {
        self.client.list_packages(&self.serial).await
    }
}
