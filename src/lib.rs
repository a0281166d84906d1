//! noxherd - Nox clone pool manager
//!
//! Manages a fixed pool of Nox emulator clones on a single host: each clone
//! is a player process plus the adb connection bound to it after startup,
//! exposed as one lifecycle object with an install/launch/input surface.
//!
//! ## Architecture
//!
//! noxherd is organized into specialized crates:
//!
//! - `noxherd-core`: configuration and player executable discovery
//! - `noxherd-emulator-bridge`: slot pool, process control, device binding
//!   and the instance command surface

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export main components for library usage
pub use noxherd_core as core;
pub use noxherd_emulator_bridge as emulator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "noxherd";

/// Prelude module for convenient imports
pub mod prelude {
    pub use noxherd_core::config::{AppConfig, PlayerConfig};
    pub use noxherd_emulator_bridge::{
        AdbClient, EmulatorInstance, InstanceState, LaunchOptions, SlotPool,
    };
}
