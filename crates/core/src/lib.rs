//! Noxherd Core - Configuration and shared types
//!
//! This crate provides configuration loading for the noxherd clone manager:
//! player executable discovery, pool sizing and device-binding budgets.

pub mod config;
pub mod error;

pub use config::{AppConfig, PlayerConfig};
pub use error::{CoreError, Result};

/// Noxherd version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "noxherd";
