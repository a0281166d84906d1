//! Error types for the clone lifecycle
//!
//! One taxonomy for the whole pool/process/binding surface; every error is
//! surfaced to the caller synchronously, nothing is retried or swallowed.

use std::time::Duration;

use thiserror::Error;

use crate::adb::AdbError;

/// Clone lifecycle errors
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Startup or launch option outside the recognized set
    #[error("Invalid startup option: {0}")]
    InvalidArgument(String),

    /// Every clone slot is checked out
    #[error("No free clone slot (capacity {0})")]
    PoolExhausted(u32),

    /// The expected adb connection never appeared within the budget
    #[error("No device bound after {timeout:?} (waiting for {expected} connection(s))")]
    BindTimedOut { expected: usize, timeout: Duration },

    /// Command issued on an instance that is not in the `Running` state
    #[error("Instance is not running")]
    InstanceNotRunning,

    /// Slot release attempted while the player process is still alive
    #[error("Instance is still running")]
    InstanceStillRunning,

    /// Terminate called on a process that has already exited
    #[error("Process is not running")]
    ProcessNotRunning,

    /// Launch-by-package with a name absent from the device listing
    #[error("Package not found on device: {0}")]
    PackageNotFound(String),

    #[error("ADB error: {0}")]
    Adb(#[from] AdbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for clone lifecycle operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
