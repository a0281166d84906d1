//! Nox Emulator Bridge
//!
//! Manages a bounded pool of player clones: slot allocation, process control
//! and adb device binding.
//!
//! The hard part lives in [`binder`]: a clone's adb connection appears
//! asynchronously some time after its process starts, and has to be
//! correlated back to that process by creation order.

pub mod adb;
pub mod binder;
pub mod device;
pub mod error;
pub mod instance;
pub mod pool;
pub mod process;

pub use adb::{AdbClient, AdbError};
pub use binder::{DeviceBinder, DeviceRegistry};
pub use device::{BoundDevice, Device, DeviceState};
pub use error::{EmulatorError, Result};
pub use instance::{EmulatorInstance, InstanceState, LaunchOptions};
pub use pool::{Slot, SlotPool, CLONE_NAME_PREFIX};
pub use process::{CloneCommand, ProcessHandle};
